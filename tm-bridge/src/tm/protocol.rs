//! Legacy JSON protocol: one JSON object per websocket text frame.
//!
//! Notices from the server are discriminated by `type`, commands from the
//! client by `action`.

use serde::{Deserialize, Serialize};

use super::codec::ProtocolError;

/// Audience display screens selectable on the legacy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudienceDisplay {
    Blank,
    Logo,
    Intro,
    InMatch,
    SavedMatchResults,
    Schedule,
    Rankings,
    SkillsRankings,
    AllianceSelection,
    ElimBracket,
    Slides,
    Inspection,
}

impl AudienceDisplay {
    pub const ALL: [AudienceDisplay; 12] = [
        AudienceDisplay::Blank,
        AudienceDisplay::Logo,
        AudienceDisplay::Intro,
        AudienceDisplay::InMatch,
        AudienceDisplay::SavedMatchResults,
        AudienceDisplay::Schedule,
        AudienceDisplay::Rankings,
        AudienceDisplay::SkillsRankings,
        AudienceDisplay::AllianceSelection,
        AudienceDisplay::ElimBracket,
        AudienceDisplay::Slides,
        AudienceDisplay::Inspection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AudienceDisplay::Blank => "BLANK",
            AudienceDisplay::Logo => "LOGO",
            AudienceDisplay::Intro => "INTRO",
            AudienceDisplay::InMatch => "IN_MATCH",
            AudienceDisplay::SavedMatchResults => "SAVED_MATCH_RESULTS",
            AudienceDisplay::Schedule => "SCHEDULE",
            AudienceDisplay::Rankings => "RANKINGS",
            AudienceDisplay::SkillsRankings => "SKILLS_RANKINGS",
            AudienceDisplay::AllianceSelection => "ALLIANCE_SELECTION",
            AudienceDisplay::ElimBracket => "ELIM_BRACKET",
            AudienceDisplay::Slides => "SLIDES",
            AudienceDisplay::Inspection => "INSPECTION",
        }
    }
}

impl std::str::FromStr for AudienceDisplay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        AudienceDisplay::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| format!("Unknown display: {}", s))
    }
}

// ── Server → Client notices ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LegacyNotice {
    #[serde(rename_all = "camelCase")]
    FieldMatchAssigned {
        #[serde(default)]
        field_id: Option<u32>,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    MatchStarted {
        #[serde(default)]
        field_id: Option<u32>,
        #[serde(default)]
        state: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MatchStopped {
        #[serde(default)]
        field_id: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    MatchPaused {
        #[serde(default)]
        field_id: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    TimeUpdated {
        remaining: u32,
        #[serde(default)]
        state: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FieldActivated {
        #[serde(default)]
        field_id: Option<u32>,
    },
    DisplayUpdated { display: AudienceDisplay },
}

impl LegacyNotice {
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ── Client → Server commands ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum LegacyCommand {
    #[serde(rename_all = "camelCase")]
    Start { field_id: u32 },
    #[serde(rename_all = "camelCase")]
    EndEarly { field_id: u32 },
    #[serde(rename_all = "camelCase")]
    Abort { field_id: u32 },
    #[serde(rename_all = "camelCase")]
    Reset { field_id: u32 },
    QueueNextMatch,
    QueuePrevMatch,
    QueueDrivingSkills,
    QueueProgrammingSkills,
    #[serde(rename_all = "camelCase")]
    SetActiveField { field_id: u32 },
    SetScreen { display: AudienceDisplay },
}

impl LegacyCommand {
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_parsing() {
        let notice =
            LegacyNotice::from_text(r#"{"type":"fieldMatchAssigned","fieldId":2,"name":"Q14"}"#)
                .unwrap();
        assert_eq!(
            notice,
            LegacyNotice::FieldMatchAssigned {
                field_id: Some(2),
                name: "Q14".into()
            }
        );
    }

    #[test]
    fn test_time_update_parsing() {
        let notice =
            LegacyNotice::from_text(r#"{"type":"timeUpdated","remaining":42,"state":"DISABLED"}"#)
                .unwrap();
        assert_eq!(
            notice,
            LegacyNotice::TimeUpdated {
                remaining: 42,
                state: Some("DISABLED".into())
            }
        );
    }

    #[test]
    fn test_display_parsing() {
        let notice =
            LegacyNotice::from_text(r#"{"type":"displayUpdated","display":"SKILLS_RANKINGS"}"#)
                .unwrap();
        assert_eq!(
            notice,
            LegacyNotice::DisplayUpdated {
                display: AudienceDisplay::SkillsRankings
            }
        );
    }

    #[test]
    fn test_unknown_notice_rejected() {
        assert!(LegacyNotice::from_text(r#"{"type":"scoreUpdated"}"#).is_err());
        assert!(LegacyNotice::from_text("not json").is_err());
    }

    #[test]
    fn test_command_wire_format() {
        let cmd = LegacyCommand::Start { field_id: 3 };
        let json: serde_json::Value = serde_json::from_str(&cmd.to_text().unwrap()).unwrap();
        assert_eq!(json["action"], "start");
        assert_eq!(json["fieldId"], 3);

        let cmd = LegacyCommand::SetScreen {
            display: AudienceDisplay::InMatch,
        };
        let json: serde_json::Value = serde_json::from_str(&cmd.to_text().unwrap()).unwrap();
        assert_eq!(json["action"], "setScreen");
        assert_eq!(json["display"], "IN_MATCH");

        assert_eq!(
            LegacyCommand::QueueNextMatch.to_text().unwrap(),
            r#"{"action":"queueNextMatch"}"#
        );
    }

    #[test]
    fn test_display_from_str() {
        assert_eq!(
            "rankings".parse::<AudienceDisplay>().unwrap(),
            AudienceDisplay::Rankings
        );
        assert!("nope".parse::<AudienceDisplay>().is_err());
    }
}
