//! Frame mangling and the connection handshake for the binary protocol.
//!
//! Every binary frame after the handshake is `[key ^ 229] ++ [b ^ key ...]`,
//! where `key` is chosen per frame by the sender.

/// Constant the per-frame key byte is XORed with on the wire.
pub const KEY_MASK: u8 = 229;

/// Handshake frame length in bytes.
pub const HANDSHAKE_LEN: usize = 128;

/// Offset of the little-endian UNIX timestamp inside the handshake.
pub const HANDSHAKE_TIMESTAMP_OFFSET: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty frame")]
    EmptyFrame,
    #[error("Frame truncated at byte {0}")]
    Truncated(usize),
    #[error("Malformed varint at byte {0}")]
    BadVarint(usize),
    #[error("Value {0} out of range")]
    OutOfRange(i64),
    #[error("Invalid union branch {0}")]
    BadUnion(i64),
    #[error("Invalid UTF-8 string: {0}")]
    BadString(#[from] std::string::FromUtf8Error),
    #[error("Unknown notice id {0}")]
    UnknownNotice(i32),
    #[error("Notice {notice} missing field '{field}'")]
    MissingField {
        notice: &'static str,
        field: &'static str,
    },
    #[error("Unexpected frame type: {0}")]
    UnexpectedFrame(&'static str),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Obfuscate `data` with `key`, prefixing the masked key byte.
pub fn mangle(data: &[u8], key: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 1);
    frame.push(key ^ KEY_MASK);
    frame.extend(data.iter().map(|b| b ^ key));
    frame
}

/// Reverse [`mangle`]: recover the key from byte 0 and unmask the rest.
pub fn unmangle(frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let (&masked, body) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
    let key = masked ^ KEY_MASK;
    Ok(body.iter().map(|b| b ^ key).collect())
}

/// Build the 128-byte handshake for the given UNIX time (seconds).
pub fn handshake(unix_secs: u32) -> [u8; HANDSHAKE_LEN] {
    let mut frame = [0u8; HANDSHAKE_LEN];
    let end = HANDSHAKE_TIMESTAMP_OFFSET + 4;
    frame[HANDSHAKE_TIMESTAMP_OFFSET..end].copy_from_slice(&unix_secs.to_le_bytes());
    frame
}

/// Handshake stamped with the current system clock.
pub fn handshake_now() -> [u8; HANDSHAKE_LEN] {
    // 32-bit field on the wire.
    handshake(chrono::Utc::now().timestamp() as u32)
}

/// Read the timestamp back out of a handshake frame.
pub fn handshake_timestamp(frame: &[u8]) -> Option<u32> {
    let end = HANDSHAKE_TIMESTAMP_OFFSET + 4;
    if frame.len() != HANDSHAKE_LEN {
        return None;
    }
    let bytes: [u8; 4] = frame[HANDSHAKE_TIMESTAMP_OFFSET..end].try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
