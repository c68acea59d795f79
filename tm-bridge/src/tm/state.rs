use std::collections::HashMap;

use serde::{Serialize, Serializer};

use super::protocol::{AudienceDisplay, LegacyNotice};
use super::schema::{FieldInfo, FieldSetNotice, MatchTuple, Round};

/// Label shown for field id 0.
pub const NO_FIELD_LABEL: &str = "N/A";

/// Match name the server uses for timeouts.
pub const TIMEOUT_MATCH_NAME: &str = "TO";
pub const DRIVING_SKILLS_MATCH_NAME: &str = "D Skills";
pub const PROGRAMMING_SKILLS_MATCH_NAME: &str = "A Coding";

/// Current segment of match play.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Unknown,
    Auto,
    Driver,
    Disabled,
    Paused,
    Timeout,
    /// Unrecognised legacy state token, passed through as-is.
    Other(String),
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Unknown => "",
            Phase::Auto => "AUTO",
            Phase::Driver => "DRIVER",
            Phase::Disabled => "DSBL",
            Phase::Paused => "PAUSED",
            Phase::Timeout => "TIMEOUT",
            Phase::Other(token) => token,
        }
    }

    /// Parse a legacy state token, folding `DISABLED` into the short form.
    pub fn from_legacy(token: &str) -> Self {
        match token {
            "AUTO" => Phase::Auto,
            "DRIVER" => Phase::Driver,
            "DISABLED" | "DSBL" => Phase::Disabled,
            "PAUSED" => Phase::Paused,
            "TIMEOUT" => Phase::Timeout,
            "" => Phase::Unknown,
            other => Phase::Other(other.to_string()),
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Display name for a queued match.
pub fn build_match_name(tuple: &MatchTuple) -> String {
    if let Some(label) = tuple.round.bracket_label() {
        return format!("{} {}-{}", label, tuple.instance, tuple.match_num);
    }
    match tuple.round {
        Round::Qual => format!("Q{}", tuple.match_num),
        Round::TopN => format!("F {}", tuple.match_num),
        Round::Practice => "P0".to_string(),
        Round::Timeout => TIMEOUT_MATCH_NAME.to_string(),
        Round::Skills if tuple.instance == 2 => DRIVING_SKILLS_MATCH_NAME.to_string(),
        Round::Skills => PROGRAMMING_SKILLS_MATCH_NAME.to_string(),
        _ => "OTHER".to_string(),
    }
}

/// Phase a match enters when it starts, judged from its name and clock.
pub fn derive_start_phase(match_name: &str, remaining: u32) -> Phase {
    if match_name == TIMEOUT_MATCH_NAME {
        return Phase::Timeout;
    }
    match remaining {
        15 | 14 | 45 | 44 => Phase::Auto,
        60 | 59 if match_name == PROGRAMMING_SKILLS_MATCH_NAME => Phase::Auto,
        _ => Phase::Driver,
    }
}

/// Field id → name, with id 0 always meaning "no field".
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    names: HashMap<u32, String>,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        let mut names = HashMap::new();
        names.insert(0, NO_FIELD_LABEL.to_string());
        Self { names }
    }
}

impl FieldRegistry {
    pub fn replace(&mut self, fields: &[FieldInfo]) {
        self.names = fields.iter().map(|f| (f.id, f.name.clone())).collect();
        self.names.insert(0, NO_FIELD_LABEL.to_string());
    }

    /// Registered name, falling back to the raw id.
    pub fn label(&self, id: u32) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

/// What the host renders: one per state-affecting notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub match_name: String,
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub is_running: bool,
    pub field_name: String,
}

/// Change raised by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Snapshot(MatchSnapshot),
    Display(AudienceDisplay),
}

/// An inbound notice from either protocol generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    FieldSet(FieldSetNotice),
    Legacy(LegacyNotice),
}

/// Derived match state, updated only by [`MatchState::handle`] and
/// [`MatchState::assume_field`].
#[derive(Debug, Clone, Default)]
pub struct MatchState {
    field_id: u32,
    running: bool,
    phase: Phase,
    remaining: u32,
    match_name: String,
    display: Option<AudienceDisplay>,
    fields: FieldRegistry,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_id(&self) -> u32 {
        self.field_id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn match_name(&self) -> &str {
        &self.match_name
    }

    pub fn display(&self) -> Option<AudienceDisplay> {
        self.display
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn field_name(&self) -> String {
        self.fields.label(self.field_id)
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            match_name: self.match_name.clone(),
            phase: self.phase.clone(),
            remaining_seconds: self.remaining,
            is_running: self.running,
            field_name: self.field_name(),
        }
    }

    /// Optimistic field hint after queueing skills; the next notice wins.
    pub fn assume_field(&mut self, field_id: u32) -> StateChange {
        self.field_id = field_id;
        StateChange::Snapshot(self.snapshot())
    }

    /// Apply a notice. Returns the change to publish, if any.
    pub fn handle(&mut self, notice: &Notice) -> Option<StateChange> {
        match notice {
            Notice::FieldSet(n) => self.handle_field_set(n),
            Notice::Legacy(n) => self.handle_legacy(n),
        }
    }

    fn set_field(&mut self, field_id: Option<u32>) {
        if let Some(id) = field_id {
            self.field_id = id;
        }
    }

    fn changed(&self) -> Option<StateChange> {
        Some(StateChange::Snapshot(self.snapshot()))
    }

    fn handle_field_set(&mut self, notice: &FieldSetNotice) -> Option<StateChange> {
        match notice {
            FieldSetNotice::MatchQueued {
                field_id,
                match_tuple,
            } => {
                self.field_id = field_id.unwrap_or(0);
                self.match_name = build_match_name(match_tuple);
                tracing::info!("Match queued: {} on field {}", self.match_name, self.field_id);
                self.changed()
            }
            FieldSetNotice::MatchStarted { field_id } => {
                self.phase = derive_start_phase(&self.match_name, self.remaining);
                self.running = true;
                self.set_field(*field_id);
                tracing::info!("Match started: {} ({})", self.match_name, self.phase.as_str());
                self.changed()
            }
            FieldSetNotice::MatchStopped { field_id } | FieldSetNotice::MatchAborted { field_id } => {
                self.running = false;
                self.phase = Phase::Disabled;
                self.set_field(*field_id);
                tracing::info!("Match stopped: {}", self.match_name);
                self.changed()
            }
            FieldSetNotice::MatchPaused { field_id } => {
                self.running = false;
                self.phase = Phase::Paused;
                self.set_field(*field_id);
                self.changed()
            }
            FieldSetNotice::TimeUpdated { remaining } => {
                self.remaining = *remaining;
                tracing::trace!("Time updated: {}", remaining);
                self.changed()
            }
            FieldSetNotice::FieldList { fields } => {
                self.fields.replace(fields);
                tracing::debug!("Field list: {} fields", fields.len());
                None
            }
            FieldSetNotice::FieldActivated { field_id } => {
                self.set_field(*field_id);
                self.changed()
            }
        }
    }

    fn handle_legacy(&mut self, notice: &LegacyNotice) -> Option<StateChange> {
        match notice {
            LegacyNotice::FieldMatchAssigned { field_id, name } => {
                self.field_id = field_id.unwrap_or(0);
                self.match_name = name.clone();
                tracing::info!("Match queued: {} on field {}", self.match_name, self.field_id);
                self.changed()
            }
            LegacyNotice::MatchStarted { field_id, state } => {
                self.phase = match state {
                    Some(token) => Phase::from_legacy(token),
                    None => derive_start_phase(&self.match_name, self.remaining),
                };
                self.running = true;
                self.set_field(*field_id);
                self.changed()
            }
            LegacyNotice::MatchStopped { field_id } => {
                self.running = false;
                self.phase = Phase::Disabled;
                self.set_field(*field_id);
                self.changed()
            }
            LegacyNotice::MatchPaused { field_id } => {
                self.running = false;
                self.phase = Phase::Paused;
                self.set_field(*field_id);
                self.changed()
            }
            LegacyNotice::TimeUpdated { remaining, state } => {
                self.remaining = *remaining;
                if let Some(token) = state {
                    self.phase = Phase::from_legacy(token);
                }
                self.changed()
            }
            LegacyNotice::FieldActivated { field_id } => {
                self.set_field(*field_id);
                self.changed()
            }
            LegacyNotice::DisplayUpdated { display } => {
                self.display = Some(*display);
                Some(StateChange::Display(*display))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(round: Round, instance: u32, match_num: u32) -> MatchTuple {
        MatchTuple {
            round,
            instance,
            match_num,
        }
    }

    fn queue(state: &mut MatchState, t: MatchTuple) {
        state.handle(&Notice::FieldSet(FieldSetNotice::MatchQueued {
            field_id: Some(1),
            match_tuple: t,
        }));
    }

    fn start_with(state: &mut MatchState, remaining: u32) -> Phase {
        state.handle(&Notice::FieldSet(FieldSetNotice::TimeUpdated { remaining }));
        state.handle(&Notice::FieldSet(FieldSetNotice::MatchStarted { field_id: Some(1) }));
        state.phase().clone()
    }

    #[test]
    fn test_match_names() {
        assert_eq!(build_match_name(&tuple(Round::Qual, 1, 12)), "Q12");
        assert_eq!(build_match_name(&tuple(Round::SemiFinal, 1, 2)), "SF 1-2");
        assert_eq!(build_match_name(&tuple(Round::R16, 3, 1)), "R16 3-1");
        assert_eq!(build_match_name(&tuple(Round::Final, 1, 1)), "F 1-1");
        assert_eq!(build_match_name(&tuple(Round::TopN, 1, 3)), "F 3");
        assert_eq!(build_match_name(&tuple(Round::Practice, 1, 7)), "P0");
        assert_eq!(build_match_name(&tuple(Round::Timeout, 0, 0)), "TO");
        assert_eq!(build_match_name(&tuple(Round::Skills, 2, 1)), "D Skills");
        assert_eq!(build_match_name(&tuple(Round::Skills, 1, 1)), "A Coding");
        assert_eq!(build_match_name(&tuple(Round::TopNSemiFinal, 1, 1)), "OTHER");
        assert_eq!(build_match_name(&tuple(Round::Other(42), 1, 1)), "OTHER");
    }

    #[test]
    fn test_start_phase_derivation() {
        let mut state = MatchState::new();
        queue(&mut state, tuple(Round::Qual, 1, 4));
        assert_eq!(start_with(&mut state, 15), Phase::Auto);
        assert_eq!(start_with(&mut state, 44), Phase::Auto);
        assert_eq!(start_with(&mut state, 60), Phase::Driver);
        assert_eq!(start_with(&mut state, 30), Phase::Driver);

        queue(&mut state, tuple(Round::Skills, 1, 1));
        assert_eq!(start_with(&mut state, 60), Phase::Auto);
        assert_eq!(start_with(&mut state, 59), Phase::Auto);

        queue(&mut state, tuple(Round::Skills, 2, 1));
        assert_eq!(start_with(&mut state, 60), Phase::Driver);

        queue(&mut state, tuple(Round::Timeout, 0, 0));
        assert_eq!(start_with(&mut state, 15), Phase::Timeout);
    }

    #[test]
    fn test_stop_pause_and_running() {
        let mut state = MatchState::new();
        queue(&mut state, tuple(Round::Qual, 1, 4));
        start_with(&mut state, 105);
        assert!(state.is_running());

        state.handle(&Notice::FieldSet(FieldSetNotice::MatchPaused { field_id: None }));
        assert!(!state.is_running());
        assert_eq!(state.phase(), &Phase::Paused);
        assert_eq!(state.field_id(), 1);

        state.handle(&Notice::FieldSet(FieldSetNotice::MatchAborted { field_id: Some(2) }));
        assert_eq!(state.phase().as_str(), "DSBL");
        assert_eq!(state.field_id(), 2);
    }

    #[test]
    fn test_queued_without_field_resets_to_zero() {
        let mut state = MatchState::new();
        state.assume_field(4);
        state.handle(&Notice::FieldSet(FieldSetNotice::MatchQueued {
            field_id: None,
            match_tuple: tuple(Round::Qual, 1, 1),
        }));
        assert_eq!(state.field_id(), 0);
        assert_eq!(state.field_name(), NO_FIELD_LABEL);
    }

    #[test]
    fn test_field_registry_injects_zero() {
        let mut state = MatchState::new();
        let change = state.handle(&Notice::FieldSet(FieldSetNotice::FieldList {
            fields: vec![
                FieldInfo {
                    id: 1,
                    name: "Field 1".into(),
                },
                FieldInfo {
                    id: 0,
                    name: "bogus".into(),
                },
            ],
        }));
        assert!(change.is_none());
        assert_eq!(state.fields().label(0), NO_FIELD_LABEL);
        assert_eq!(state.fields().label(1), "Field 1");
        assert_eq!(state.fields().label(2), "2");

        state.handle(&Notice::FieldSet(FieldSetNotice::FieldActivated { field_id: Some(1) }));
        assert_eq!(state.snapshot().field_name, "Field 1");
    }

    #[test]
    fn test_time_update_emits_snapshot() {
        let mut state = MatchState::new();
        let change = state.handle(&Notice::FieldSet(FieldSetNotice::TimeUpdated { remaining: 9 }));
        match change {
            Some(StateChange::Snapshot(s)) => assert_eq!(s.remaining_seconds, 9),
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn test_legacy_state_normalization() {
        let mut state = MatchState::new();
        state.handle(&Notice::Legacy(LegacyNotice::FieldMatchAssigned {
            field_id: Some(3),
            name: "Q9".into(),
        }));
        state.handle(&Notice::Legacy(LegacyNotice::TimeUpdated {
            remaining: 0,
            state: Some("DISABLED".into()),
        }));
        assert_eq!(state.phase().as_str(), "DSBL");

        state.handle(&Notice::Legacy(LegacyNotice::TimeUpdated {
            remaining: 12,
            state: Some("AUTON_WAIT".into()),
        }));
        assert_eq!(state.phase().as_str(), "AUTON_WAIT");

        let snapshot = state.snapshot();
        assert_eq!(snapshot.match_name, "Q9");
        assert_eq!(snapshot.field_name, "3");
    }

    #[test]
    fn test_legacy_display_change() {
        let mut state = MatchState::new();
        let change = state.handle(&Notice::Legacy(LegacyNotice::DisplayUpdated {
            display: AudienceDisplay::Rankings,
        }));
        assert_eq!(change, Some(StateChange::Display(AudienceDisplay::Rankings)));
        assert_eq!(state.display(), Some(AudienceDisplay::Rankings));
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut state = MatchState::new();
        queue(&mut state, tuple(Round::Qual, 1, 12));
        start_with(&mut state, 15);
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["matchName"], "Q12");
        assert_eq!(json["phase"], "AUTO");
        assert_eq!(json["remainingSeconds"], 15);
        assert_eq!(json["isRunning"], true);
        assert_eq!(json["fieldName"], "1");
    }
}
