//! The two protocol generations behind one client interface.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::{AuthError, Authenticator, HttpAuthenticator, SessionCache};
use super::codec::{handshake_now, ProtocolError};
use super::commands::{FieldCommand, Operation};
use super::connection::{Dialer, FieldControlError, Frame, Transport, WsDialer};
use super::protocol::{LegacyCommand, LegacyNotice};
use super::schema::{decode_notice, encode_request, FieldControlAction, FieldSetRequest, QueueKind};
use super::state::Notice;
use crate::config::ConnectionConfig;

/// Protocol generation spoken by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    #[default]
    Binary,
    Legacy,
}

impl Generation {
    /// Whether the server side of this generation accepts the operation.
    pub fn supports(self, op: &Operation) -> bool {
        !matches!(
            (self, op),
            (
                Generation::Binary,
                Operation::QueuePrevMatch | Operation::SelectDisplay(_)
            )
        )
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Binary => f.write_str("binary"),
            Generation::Legacy => f.write_str("legacy"),
        }
    }
}

impl std::str::FromStr for Generation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "v2" => Ok(Generation::Binary),
            "legacy" | "json" | "v1" => Ok(Generation::Legacy),
            other => Err(format!("unknown protocol generation '{}'", other)),
        }
    }
}

/// One protocol generation: how to open the stream and how to encode and
/// decode what travels over it.
pub trait FieldControlClient: Send {
    type Transport: Transport + 'static;

    fn generation(&self) -> Generation;

    /// Authenticate if required, open the stream and complete any handshake.
    fn open(
        &mut self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Transport, FieldControlError>> + Send;

    /// Drop any cached credential.
    fn invalidate(&mut self);

    /// Whether the credential the stream relies on has lapsed.
    fn session_expired(&self, _now: DateTime<Utc>) -> bool {
        false
    }

    fn encode(&self, command: &FieldCommand) -> Result<Frame, FieldControlError>;

    fn decode(&self, frame: Frame) -> Result<Notice, ProtocolError>;
}

// ── Binary generation ──

/// Mangled, schema-encoded frames after a timestamp handshake.
#[derive(Debug, Default)]
pub struct BinaryClient<D = WsDialer> {
    dialer: D,
}

impl BinaryClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: Dialer> BinaryClient<D> {
    pub fn with_dialer(dialer: D) -> Self {
        Self { dialer }
    }
}

pub fn binary_url(config: &ConnectionConfig) -> String {
    format!("ws://{}/api/fieldsets/{}/ws", config.address, config.field_set)
}

/// Map a command onto the binary request schema.
pub fn binary_request(command: &FieldCommand) -> Result<FieldSetRequest, FieldControlError> {
    let control = |action, field_id| FieldSetRequest::FieldControl { action, field_id };
    let request = match *command {
        FieldCommand::Start { field_id } => control(FieldControlAction::Start, field_id),
        FieldCommand::EndEarly { field_id } => control(FieldControlAction::EndEarly, field_id),
        FieldCommand::Abort { field_id } => control(FieldControlAction::Abort, field_id),
        FieldCommand::ResetTimer { field_id } => control(FieldControlAction::ResetTimer, field_id),
        FieldCommand::QueueNextMatch => FieldSetRequest::QueueMatch(QueueKind::NextMatch),
        FieldCommand::QueueDrivingSkills => FieldSetRequest::QueueMatch(QueueKind::DrivingSkills),
        FieldCommand::QueueProgrammingSkills => {
            FieldSetRequest::QueueMatch(QueueKind::ProgrammingSkills)
        }
        FieldCommand::SetActiveField { field_id } => FieldSetRequest::SetActiveField { field_id },
        FieldCommand::QueuePrevMatch => {
            return Err(FieldControlError::Unsupported {
                operation: Operation::QueuePrevMatch.name(),
                generation: Generation::Binary,
            })
        }
        FieldCommand::SelectDisplay(display) => {
            return Err(FieldControlError::Unsupported {
                operation: Operation::SelectDisplay(display).name(),
                generation: Generation::Binary,
            })
        }
    };
    Ok(request)
}

impl<D: Dialer> FieldControlClient for BinaryClient<D> {
    type Transport = D::Transport;

    fn generation(&self) -> Generation {
        Generation::Binary
    }

    async fn open(&mut self, config: &ConnectionConfig) -> Result<D::Transport, FieldControlError> {
        let mut headers = Vec::new();
        if !config.secret.is_empty() {
            headers.push(("Authorization", format!("Bearer {}", config.secret)));
        }
        let mut transport = self.dialer.dial(&binary_url(config), &headers).await?;
        transport.send(Frame::Binary(handshake_now().to_vec())).await?;
        Ok(transport)
    }

    fn invalidate(&mut self) {}

    fn encode(&self, command: &FieldCommand) -> Result<Frame, FieldControlError> {
        let request = binary_request(command)?;
        Ok(Frame::Binary(encode_request(&request, rand::random())))
    }

    fn decode(&self, frame: Frame) -> Result<Notice, ProtocolError> {
        match frame {
            Frame::Binary(bytes) => Ok(Notice::FieldSet(decode_notice(&bytes)?)),
            Frame::Text(_) => Err(ProtocolError::UnexpectedFrame("text")),
        }
    }
}

// ── Legacy generation ──

/// JSON frames over a cookie-authenticated websocket.
pub struct LegacyClient<A = HttpAuthenticator, D = WsDialer> {
    sessions: SessionCache<A>,
    dialer: D,
}

impl LegacyClient {
    pub fn new() -> Result<Self, AuthError> {
        Ok(Self::with_parts(HttpAuthenticator::new()?, WsDialer))
    }
}

impl<A: Authenticator, D: Dialer> LegacyClient<A, D> {
    pub fn with_parts(auth: A, dialer: D) -> Self {
        Self {
            sessions: SessionCache::new(auth),
            dialer,
        }
    }
}

pub fn legacy_url(config: &ConnectionConfig) -> String {
    format!("ws://{}/fieldsets/{}", config.address, config.field_set)
}

/// Map a command onto the legacy JSON actions.
pub fn legacy_command(command: &FieldCommand) -> LegacyCommand {
    match *command {
        FieldCommand::Start { field_id } => LegacyCommand::Start { field_id },
        FieldCommand::EndEarly { field_id } => LegacyCommand::EndEarly { field_id },
        FieldCommand::Abort { field_id } => LegacyCommand::Abort { field_id },
        FieldCommand::ResetTimer { field_id } => LegacyCommand::Reset { field_id },
        FieldCommand::QueueNextMatch => LegacyCommand::QueueNextMatch,
        FieldCommand::QueuePrevMatch => LegacyCommand::QueuePrevMatch,
        FieldCommand::QueueDrivingSkills => LegacyCommand::QueueDrivingSkills,
        FieldCommand::QueueProgrammingSkills => LegacyCommand::QueueProgrammingSkills,
        FieldCommand::SetActiveField { field_id } => LegacyCommand::SetActiveField { field_id },
        FieldCommand::SelectDisplay(display) => LegacyCommand::SetScreen { display },
    }
}

impl<A: Authenticator, D: Dialer> FieldControlClient for LegacyClient<A, D> {
    type Transport = D::Transport;

    fn generation(&self) -> Generation {
        Generation::Legacy
    }

    async fn open(&mut self, config: &ConnectionConfig) -> Result<D::Transport, FieldControlError> {
        let session = self
            .sessions
            .session(&config.address, &config.secret, Utc::now())
            .await?;
        self.dialer
            .dial(&legacy_url(config), &[("Cookie", session.cookie)])
            .await
    }

    fn invalidate(&mut self) {
        self.sessions.invalidate();
    }

    fn session_expired(&self, now: DateTime<Utc>) -> bool {
        !self.sessions.is_fresh(now)
    }

    fn encode(&self, command: &FieldCommand) -> Result<Frame, FieldControlError> {
        Ok(Frame::Text(legacy_command(command).to_text()?))
    }

    fn decode(&self, frame: Frame) -> Result<Notice, ProtocolError> {
        match frame {
            Frame::Text(text) => Ok(Notice::Legacy(LegacyNotice::from_text(&text)?)),
            Frame::Binary(_) => Err(ProtocolError::UnexpectedFrame("binary")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tm::codec::unmangle;
    use crate::tm::protocol::AudienceDisplay;
    use crate::tm::schema::{FieldSetNotice, MatchTuple, Round};

    #[test]
    fn test_generation_support() {
        assert!(!Generation::Binary.supports(&Operation::QueuePrevMatch));
        assert!(!Generation::Binary.supports(&Operation::SelectDisplay(AudienceDisplay::Logo)));
        assert!(Generation::Binary.supports(&Operation::Start));
        assert!(Generation::Legacy.supports(&Operation::QueuePrevMatch));
        assert!(Generation::Legacy.supports(&Operation::SelectDisplay(AudienceDisplay::Logo)));
    }

    #[test]
    fn test_generation_parse() {
        assert_eq!("Legacy".parse::<Generation>().unwrap(), Generation::Legacy);
        assert_eq!("binary".parse::<Generation>().unwrap(), Generation::Binary);
        assert!("v3".parse::<Generation>().is_err());
        assert_eq!(Generation::Legacy.to_string(), "legacy");
    }

    #[test]
    fn test_binary_encode_start() {
        let client = BinaryClient::new();
        let frame = client.encode(&FieldCommand::Start { field_id: 3 }).unwrap();
        let Frame::Binary(bytes) = frame else {
            panic!("expected binary frame");
        };
        let body = unmangle(&bytes).unwrap();
        assert_eq!(
            FieldSetRequest::decode(&body).unwrap(),
            FieldSetRequest::FieldControl {
                action: FieldControlAction::Start,
                field_id: 3
            }
        );
    }

    #[test]
    fn test_binary_unsupported() {
        let client = BinaryClient::new();
        assert!(matches!(
            client.encode(&FieldCommand::QueuePrevMatch),
            Err(FieldControlError::Unsupported {
                generation: Generation::Binary,
                ..
            })
        ));
    }

    #[test]
    fn test_binary_decode() {
        let client = BinaryClient::new();
        let notice = FieldSetNotice::MatchQueued {
            field_id: Some(1),
            match_tuple: MatchTuple {
                round: Round::Qual,
                instance: 1,
                match_num: 5,
            },
        };
        let frame = Frame::Binary(crate::tm::codec::mangle(&notice.encode(), 0x42));
        assert_eq!(client.decode(frame).unwrap(), Notice::FieldSet(notice));
        assert!(client.decode(Frame::Text("{}".into())).is_err());
    }

    #[test]
    fn test_legacy_command_mapping() {
        assert_eq!(
            legacy_command(&FieldCommand::ResetTimer { field_id: 1 }),
            LegacyCommand::Reset { field_id: 1 }
        );
        assert_eq!(
            legacy_command(&FieldCommand::SelectDisplay(AudienceDisplay::Rankings)),
            LegacyCommand::SetScreen {
                display: AudienceDisplay::Rankings
            }
        );
    }

    #[test]
    fn test_urls() {
        let config = ConnectionConfig {
            address: "tm.local:8080".into(),
            field_set: 2,
            ..Default::default()
        };
        assert_eq!(binary_url(&config), "ws://tm.local:8080/api/fieldsets/2/ws");
        assert_eq!(legacy_url(&config), "ws://tm.local:8080/fieldsets/2");
    }
}
