//! Command façade: turns user operations into protocol-neutral commands.

use super::protocol::AudienceDisplay;
use super::state::MatchState;

/// An operation requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    EndEarly,
    StartOrEnd,
    Abort,
    ResetTimer,
    QueueNextMatch,
    QueuePrevMatch,
    QueueDrivingSkills { field_id: u32 },
    QueueProgrammingSkills { field_id: u32 },
    SelectDisplay(AudienceDisplay),
    MoveMatchToField { field_id: u32 },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::EndEarly => "end-early",
            Operation::StartOrEnd => "start-or-end",
            Operation::Abort => "abort",
            Operation::ResetTimer => "reset-timer",
            Operation::QueueNextMatch => "queue-next-match",
            Operation::QueuePrevMatch => "queue-prev-match",
            Operation::QueueDrivingSkills { .. } => "queue-driving-skills",
            Operation::QueueProgrammingSkills { .. } => "queue-programming-skills",
            Operation::SelectDisplay(_) => "select-display",
            Operation::MoveMatchToField { .. } => "move-match-to-field",
        }
    }

    /// Commands to send for this operation given the current state.
    ///
    /// `start` while running and `end-early` while idle plan nothing.
    pub fn plan(&self, state: &MatchState) -> Plan {
        let field_id = state.field_id();
        let commands = match *self {
            Operation::Start if state.is_running() => vec![],
            Operation::Start => vec![FieldCommand::Start { field_id }],
            Operation::EndEarly if !state.is_running() => vec![],
            Operation::EndEarly => vec![FieldCommand::EndEarly { field_id }],
            Operation::StartOrEnd if state.is_running() => {
                return Operation::EndEarly.plan(state);
            }
            Operation::StartOrEnd => return Operation::Start.plan(state),
            Operation::Abort => vec![FieldCommand::Abort { field_id }],
            Operation::ResetTimer => vec![FieldCommand::ResetTimer { field_id }],
            Operation::QueueNextMatch => vec![FieldCommand::QueueNextMatch],
            Operation::QueuePrevMatch => vec![FieldCommand::QueuePrevMatch],
            Operation::QueueDrivingSkills { field_id } => {
                return Plan {
                    commands: vec![
                        FieldCommand::QueueDrivingSkills,
                        FieldCommand::SetActiveField { field_id },
                    ],
                    assume_field: Some(field_id),
                };
            }
            Operation::QueueProgrammingSkills { field_id } => {
                return Plan {
                    commands: vec![
                        FieldCommand::QueueProgrammingSkills,
                        FieldCommand::SetActiveField { field_id },
                    ],
                    assume_field: Some(field_id),
                };
            }
            Operation::SelectDisplay(display) => vec![FieldCommand::SelectDisplay(display)],
            Operation::MoveMatchToField { field_id } => {
                vec![FieldCommand::SetActiveField { field_id }]
            }
        };
        Plan {
            commands,
            assume_field: None,
        }
    }
}

/// A single command frame, before protocol encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCommand {
    Start { field_id: u32 },
    EndEarly { field_id: u32 },
    Abort { field_id: u32 },
    ResetTimer { field_id: u32 },
    QueueNextMatch,
    QueuePrevMatch,
    QueueDrivingSkills,
    QueueProgrammingSkills,
    SetActiveField { field_id: u32 },
    SelectDisplay(AudienceDisplay),
}

/// Output of [`Operation::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub commands: Vec<FieldCommand>,
    /// Field to record optimistically once the commands are sent.
    pub assume_field: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tm::schema::{FieldSetNotice, MatchTuple, Round};
    use crate::tm::state::Notice;

    fn running_state() -> MatchState {
        let mut state = MatchState::new();
        state.handle(&Notice::FieldSet(FieldSetNotice::MatchQueued {
            field_id: Some(2),
            match_tuple: MatchTuple {
                round: Round::Qual,
                instance: 1,
                match_num: 3,
            },
        }));
        state.handle(&Notice::FieldSet(FieldSetNotice::MatchStarted { field_id: Some(2) }));
        state
    }

    #[test]
    fn test_start_idempotent() {
        let idle = MatchState::new();
        assert_eq!(
            Operation::Start.plan(&idle).commands,
            vec![FieldCommand::Start { field_id: 0 }]
        );
        assert!(Operation::Start.plan(&running_state()).commands.is_empty());
    }

    #[test]
    fn test_end_early_only_when_running() {
        assert!(Operation::EndEarly.plan(&MatchState::new()).commands.is_empty());
        assert_eq!(
            Operation::EndEarly.plan(&running_state()).commands,
            vec![FieldCommand::EndEarly { field_id: 2 }]
        );
    }

    #[test]
    fn test_start_or_end_dispatch() {
        assert_eq!(
            Operation::StartOrEnd.plan(&MatchState::new()).commands,
            vec![FieldCommand::Start { field_id: 0 }]
        );
        assert_eq!(
            Operation::StartOrEnd.plan(&running_state()).commands,
            vec![FieldCommand::EndEarly { field_id: 2 }]
        );
    }

    #[test]
    fn test_skills_sets_active_field() {
        let plan = Operation::QueueProgrammingSkills { field_id: 4 }.plan(&MatchState::new());
        assert_eq!(
            plan.commands,
            vec![
                FieldCommand::QueueProgrammingSkills,
                FieldCommand::SetActiveField { field_id: 4 }
            ]
        );
        assert_eq!(plan.assume_field, Some(4));
    }

    #[test]
    fn test_move_match_is_set_active_field() {
        let plan = Operation::MoveMatchToField { field_id: 7 }.plan(&MatchState::new());
        assert_eq!(plan.commands, vec![FieldCommand::SetActiveField { field_id: 7 }]);
        assert_eq!(plan.assume_field, None);
    }
}
