use serde::{Deserialize, Serialize};

use super::messages::{
    EffectApplyMsg, MatchCompleteMsg, MatchMessage, MessageType, PositionUpdateMsg, ScoredMsg,
    ShotMsg,
};

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_payload<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `MatchMessage` to wire format.
pub fn encode_message(msg: &MatchMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        MatchMessage::Shot(m) => encode_payload(MessageType::Shot, m),
        MatchMessage::EffectApply(m) => encode_payload(MessageType::EffectApply, m),
        MatchMessage::PositionUpdate(m) => encode_payload(MessageType::PositionUpdate, m),
        MatchMessage::Scored(m) => encode_payload(MessageType::Scored, m),
        MatchMessage::MatchComplete(m) => encode_payload(MessageType::MatchComplete, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::EmptyMessage);
    };
    MessageType::from_byte(first).ok_or(ProtocolError::UnknownMessageType(first))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `MatchMessage`.
pub fn decode_message(data: &[u8]) -> Result<MatchMessage, ProtocolError> {
    let msg = match decode_message_type(data)? {
        MessageType::Shot => MatchMessage::Shot(decode_payload::<ShotMsg>(data)?),
        MessageType::EffectApply => {
            MatchMessage::EffectApply(decode_payload::<EffectApplyMsg>(data)?)
        },
        MessageType::PositionUpdate => {
            MatchMessage::PositionUpdate(decode_payload::<PositionUpdateMsg>(data)?)
        },
        MessageType::Scored => MatchMessage::Scored(decode_payload::<ScoredMsg>(data)?),
        MessageType::MatchComplete => {
            MatchMessage::MatchComplete(decode_payload::<MatchCompleteMsg>(data)?)
        },
    };
    Ok(msg)
}

/// Decode, logging and discarding anything malformed.
pub fn decode_or_drop(data: &[u8]) -> Option<MatchMessage> {
    match decode_message(data) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::debug!(len = data.len(), error = %e, "Dropped malformed match message");
            None
        },
    }
}
