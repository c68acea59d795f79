//! Schema-encoded field-set notices and requests (binary protocol).
//!
//! Values use the Avro binary layout: zigzag varints for integers,
//! length-prefixed UTF-8 strings, `[null, T]` unions as a branch index
//! followed by the value, and arrays as counted blocks ending in zero.

use super::codec::{mangle, unmangle, ProtocolError};

// ── Round ──

/// Round designator carried in a match tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    Practice,
    Qual,
    QuarterFinal,
    SemiFinal,
    Final,
    R16,
    R32,
    R64,
    R128,
    TopN,
    TopNQuarterFinal,
    TopNSemiFinal,
    TopNFinal,
    Skills,
    Timeout,
    Other(i32),
}

impl Round {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Round::Practice,
            2 => Round::Qual,
            3 => Round::QuarterFinal,
            4 => Round::SemiFinal,
            5 => Round::Final,
            6 => Round::R16,
            7 => Round::R32,
            8 => Round::R64,
            9 => Round::R128,
            10 => Round::TopN,
            11 => Round::TopNQuarterFinal,
            12 => Round::TopNSemiFinal,
            13 => Round::TopNFinal,
            14 => Round::Skills,
            15 => Round::Timeout,
            other => Round::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Round::Practice => 1,
            Round::Qual => 2,
            Round::QuarterFinal => 3,
            Round::SemiFinal => 4,
            Round::Final => 5,
            Round::R16 => 6,
            Round::R32 => 7,
            Round::R64 => 8,
            Round::R128 => 9,
            Round::TopN => 10,
            Round::TopNQuarterFinal => 11,
            Round::TopNSemiFinal => 12,
            Round::TopNFinal => 13,
            Round::Skills => 14,
            Round::Timeout => 15,
            Round::Other(code) => code,
        }
    }

    /// Short label for bracketed elimination rounds, `None` for everything else.
    pub fn bracket_label(self) -> Option<&'static str> {
        match self {
            Round::R128 => Some("R128"),
            Round::R64 => Some("R64"),
            Round::R32 => Some("R32"),
            Round::R16 => Some("R16"),
            Round::QuarterFinal => Some("QF"),
            Round::SemiFinal => Some("SF"),
            Round::Final => Some("F"),
            _ => None,
        }
    }
}

/// Round, instance and match number identifying one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTuple {
    pub round: Round,
    pub instance: u32,
    pub match_num: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub id: u32,
    pub name: String,
}

// ── Server → Client notices ──

pub const NOTICE_MATCH_QUEUED: i32 = 1;
pub const NOTICE_MATCH_STARTED: i32 = 2;
pub const NOTICE_MATCH_STOPPED: i32 = 3;
pub const NOTICE_MATCH_ABORTED: i32 = 4;
pub const NOTICE_MATCH_PAUSED: i32 = 5;
pub const NOTICE_TIME_UPDATED: i32 = 6;
pub const NOTICE_FIELD_LIST: i32 = 7;
pub const NOTICE_FIELD_ACTIVATED: i32 = 8;

/// A decoded field-set notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSetNotice {
    MatchQueued {
        field_id: Option<u32>,
        match_tuple: MatchTuple,
    },
    MatchStarted { field_id: Option<u32> },
    MatchStopped { field_id: Option<u32> },
    MatchAborted { field_id: Option<u32> },
    MatchPaused { field_id: Option<u32> },
    TimeUpdated { remaining: u32 },
    FieldList { fields: Vec<FieldInfo> },
    FieldActivated { field_id: Option<u32> },
}

impl FieldSetNotice {
    pub fn id(&self) -> i32 {
        match self {
            FieldSetNotice::MatchQueued { .. } => NOTICE_MATCH_QUEUED,
            FieldSetNotice::MatchStarted { .. } => NOTICE_MATCH_STARTED,
            FieldSetNotice::MatchStopped { .. } => NOTICE_MATCH_STOPPED,
            FieldSetNotice::MatchAborted { .. } => NOTICE_MATCH_ABORTED,
            FieldSetNotice::MatchPaused { .. } => NOTICE_MATCH_PAUSED,
            FieldSetNotice::TimeUpdated { .. } => NOTICE_TIME_UPDATED,
            FieldSetNotice::FieldList { .. } => NOTICE_FIELD_LIST,
            FieldSetNotice::FieldActivated { .. } => NOTICE_FIELD_ACTIVATED,
        }
    }

    /// Decode a notice body (already unmangled).
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(body);
        let id = r.read_int()?;
        let field_id = r.read_optional(|r| r.read_u32())?;
        let match_tuple = r.read_optional(|r| {
            Ok(MatchTuple {
                round: Round::from_code(r.read_int()?),
                instance: r.read_u32()?,
                match_num: r.read_u32()?,
            })
        })?;
        let remaining = r.read_optional(|r| r.read_u32())?;
        let fields = r.read_optional(|r| {
            r.read_array(|r| {
                Ok(FieldInfo {
                    id: r.read_u32()?,
                    name: r.read_string()?,
                })
            })
        })?;

        let notice = match id {
            NOTICE_MATCH_QUEUED => FieldSetNotice::MatchQueued {
                field_id,
                match_tuple: match_tuple.ok_or(ProtocolError::MissingField {
                    notice: "match-queued",
                    field: "match",
                })?,
            },
            NOTICE_MATCH_STARTED => FieldSetNotice::MatchStarted { field_id },
            NOTICE_MATCH_STOPPED => FieldSetNotice::MatchStopped { field_id },
            NOTICE_MATCH_ABORTED => FieldSetNotice::MatchAborted { field_id },
            NOTICE_MATCH_PAUSED => FieldSetNotice::MatchPaused { field_id },
            NOTICE_TIME_UPDATED => FieldSetNotice::TimeUpdated {
                remaining: remaining.ok_or(ProtocolError::MissingField {
                    notice: "time-updated",
                    field: "remaining",
                })?,
            },
            NOTICE_FIELD_LIST => FieldSetNotice::FieldList {
                fields: fields.unwrap_or_default(),
            },
            NOTICE_FIELD_ACTIVATED => FieldSetNotice::FieldActivated { field_id },
            other => return Err(ProtocolError::UnknownNotice(other)),
        };
        Ok(notice)
    }

    /// Encode a notice body, as the server would.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.write_int(self.id());

        let field_id = match self {
            FieldSetNotice::MatchQueued { field_id, .. }
            | FieldSetNotice::MatchStarted { field_id }
            | FieldSetNotice::MatchStopped { field_id }
            | FieldSetNotice::MatchAborted { field_id }
            | FieldSetNotice::MatchPaused { field_id }
            | FieldSetNotice::FieldActivated { field_id } => *field_id,
            FieldSetNotice::TimeUpdated { .. } | FieldSetNotice::FieldList { .. } => None,
        };
        w.write_optional(field_id, |w, id| w.write_u32(id));

        let tuple = match self {
            FieldSetNotice::MatchQueued { match_tuple, .. } => Some(*match_tuple),
            _ => None,
        };
        w.write_optional(tuple, |w, t| {
            w.write_int(t.round.code());
            w.write_u32(t.instance);
            w.write_u32(t.match_num);
        });

        let remaining = match self {
            FieldSetNotice::TimeUpdated { remaining } => Some(*remaining),
            _ => None,
        };
        w.write_optional(remaining, |w, secs| w.write_u32(secs));

        let fields = match self {
            FieldSetNotice::FieldList { fields } => Some(fields.as_slice()),
            _ => None,
        };
        w.write_optional(fields, |w, fields| {
            w.write_array(fields, |w, f| {
                w.write_u32(f.id);
                w.write_string(&f.name);
            })
        });

        w.into_bytes()
    }
}

// ── Client → Server requests ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldControlAction {
    Start = 1,
    EndEarly = 2,
    Abort = 3,
    ResetTimer = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    NextMatch = 1,
    DrivingSkills = 2,
    ProgrammingSkills = 3,
}

const REQUEST_FIELD_CONTROL: i64 = 0;
const REQUEST_QUEUE_MATCH: i64 = 1;
const REQUEST_SET_ACTIVE_FIELD: i64 = 2;

/// A field-set request, encoded as a union over its named variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSetRequest {
    FieldControl {
        action: FieldControlAction,
        field_id: u32,
    },
    QueueMatch(QueueKind),
    SetActiveField { field_id: u32 },
}

impl FieldSetRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::default();
        match *self {
            FieldSetRequest::FieldControl { action, field_id } => {
                w.write_long(REQUEST_FIELD_CONTROL);
                w.write_int(action as i32);
                w.write_u32(field_id);
            }
            FieldSetRequest::QueueMatch(kind) => {
                w.write_long(REQUEST_QUEUE_MATCH);
                w.write_int(kind as i32);
            }
            FieldSetRequest::SetActiveField { field_id } => {
                w.write_long(REQUEST_SET_ACTIVE_FIELD);
                w.write_u32(field_id);
            }
        }
        w.into_bytes()
    }

    /// Decode a request body, as the server would.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(body);
        match r.read_long()? {
            REQUEST_FIELD_CONTROL => {
                let action = match r.read_int()? {
                    1 => FieldControlAction::Start,
                    2 => FieldControlAction::EndEarly,
                    3 => FieldControlAction::Abort,
                    4 => FieldControlAction::ResetTimer,
                    other => return Err(ProtocolError::OutOfRange(other as i64)),
                };
                Ok(FieldSetRequest::FieldControl {
                    action,
                    field_id: r.read_u32()?,
                })
            }
            REQUEST_QUEUE_MATCH => {
                let kind = match r.read_int()? {
                    1 => QueueKind::NextMatch,
                    2 => QueueKind::DrivingSkills,
                    3 => QueueKind::ProgrammingSkills,
                    other => return Err(ProtocolError::OutOfRange(other as i64)),
                };
                Ok(FieldSetRequest::QueueMatch(kind))
            }
            REQUEST_SET_ACTIVE_FIELD => Ok(FieldSetRequest::SetActiveField {
                field_id: r.read_u32()?,
            }),
            other => Err(ProtocolError::BadUnion(other)),
        }
    }
}

/// Encode and mangle a request into a wire frame.
pub fn encode_request(request: &FieldSetRequest, key: u8) -> Vec<u8> {
    mangle(&request.encode(), key)
}

/// Unmangle and decode a notice frame.
pub fn decode_notice(frame: &[u8]) -> Result<FieldSetNotice, ProtocolError> {
    FieldSetNotice::decode(&unmangle(frame)?)
}

// ── Binary primitives ──

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(ProtocolError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_long(&mut self) -> Result<i64, ProtocolError> {
        let start = self.pos;
        let mut raw: u64 = 0;
        let mut shift = 0;
        loop {
            if shift > 63 {
                return Err(ProtocolError::BadVarint(start));
            }
            let b = self.read_byte()?;
            raw |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    fn read_int(&mut self) -> Result<i32, ProtocolError> {
        let v = self.read_long()?;
        i32::try_from(v).map_err(|_| ProtocolError::OutOfRange(v))
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let v = self.read_long()?;
        u32::try_from(v).map_err(|_| ProtocolError::OutOfRange(v))
    }

    fn read_len(&mut self) -> Result<usize, ProtocolError> {
        let v = self.read_long()?;
        usize::try_from(v).map_err(|_| ProtocolError::OutOfRange(v))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_len()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ProtocolError::Truncated(self.buf.len()))?;
        let bytes = self.buf[self.pos..end].to_vec();
        self.pos = end;
        Ok(String::from_utf8(bytes)?)
    }

    fn read_optional<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Option<T>, ProtocolError> {
        match self.read_long()? {
            0 => Ok(None),
            1 => read(self).map(Some),
            other => Err(ProtocolError::BadUnion(other)),
        }
    }

    fn read_array<T>(
        &mut self,
        mut read: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Vec<T>, ProtocolError> {
        let mut items = Vec::new();
        loop {
            let mut count = self.read_long()?;
            if count == 0 {
                return Ok(items);
            }
            if count < 0 {
                // Negative count is followed by the block's byte size.
                count = count.checked_neg().ok_or(ProtocolError::OutOfRange(count))?;
                self.read_long()?;
            }
            for _ in 0..count {
                items.push(read(self)?);
            }
        }
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn write_long(&mut self, v: i64) {
        let mut raw = ((v << 1) ^ (v >> 63)) as u64;
        while raw >= 0x80 {
            self.buf.push((raw as u8 & 0x7f) | 0x80);
            raw >>= 7;
        }
        self.buf.push(raw as u8);
    }

    fn write_int(&mut self, v: i32) {
        self.write_long(v as i64);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_long(v as i64);
    }

    fn write_string(&mut self, s: &str) {
        self.write_long(s.len() as i64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn write_optional<T>(&mut self, value: Option<T>, write: impl FnOnce(&mut Self, T)) {
        match value {
            None => self.write_long(0),
            Some(v) => {
                self.write_long(1);
                write(self, v);
            }
        }
    }

    fn write_array<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) {
        if !items.is_empty() {
            self.write_long(items.len() as i64);
            for item in items {
                write(self, item);
            }
        }
        self.write_long(0);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
