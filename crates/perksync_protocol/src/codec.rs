//! CBOR helpers shared by wire frames and persisted snapshots.
//!
//! Frames are CBOR maps with text keys. Keys are sorted length-first and then
//! bytewise before encoding, so identical messages produce identical bytes.

use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The CBOR was well formed but did not have the expected shape.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// The frame carried an unknown message type code.
    #[error("unknown message type code: {0}")]
    UnknownMessageType(u8),

    /// The frame was addressed to a different payload kind.
    #[error("perk kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        /// Kind the decoder was asked for.
        expected: String,
        /// Kind found in the frame.
        actual: String,
    },

    /// The frame was produced by an incompatible protocol version.
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch {
        /// Local protocol version.
        local: u16,
        /// Version found in the frame.
        remote: u16,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

/// Encode a CBOR value to bytes.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Decode bytes into a CBOR value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Convert a serde value into a CBOR value.
pub fn to_value<T: Serialize>(value: &T) -> CodecResult<Value> {
    Value::serialized(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Convert a CBOR value back into a serde value.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    value
        .deserialized()
        .map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Build a map value from text-keyed pairs with canonically sorted keys.
pub fn text_map(pairs: Vec<(&str, Value)>) -> Value {
    let mut pairs: Vec<(Value, Value)> = pairs
        .into_iter()
        .map(|(k, v)| (Value::Text(k.to_string()), v))
        .collect();
    pairs.sort_by(|a, b| cmp_text_keys(&a.0, &b.0));
    Value::Map(pairs)
}

/// Length-first, then bytewise ordering of text keys.
fn cmp_text_keys(a: &Value, b: &Value) -> Ordering {
    match (a.as_text(), b.as_text()) {
        (Some(a), Some(b)) => match a.len().cmp(&b.len()) {
            Ordering::Equal => a.as_bytes().cmp(b.as_bytes()),
            ord => ord,
        },
        _ => Ordering::Equal,
    }
}

/// Borrow the entries of a map value.
pub fn expect_map(value: &Value) -> CodecResult<&[(Value, Value)]> {
    value
        .as_map()
        .map(Vec::as_slice)
        .ok_or_else(|| CodecError::invalid_structure("expected map"))
}

/// Look up a text-keyed field in map entries.
pub fn field<'a>(map: &'a [(Value, Value)], name: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(name))
        .map(|(_, v)| v)
}

/// Look up a required field, failing with a structural error if absent.
pub fn required_field<'a>(map: &'a [(Value, Value)], name: &str) -> CodecResult<&'a Value> {
    field(map, name).ok_or_else(|| CodecError::invalid_structure(format!("missing {name}")))
}

/// Read a small unsigned integer field.
pub fn u16_field(map: &[(Value, Value)], name: &str) -> CodecResult<u16> {
    required_field(map, name)?
        .as_integer()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| CodecError::invalid_structure(format!("{name} is not a u16")))
}

/// Read a text field.
pub fn text_field<'a>(map: &'a [(Value, Value)], name: &str) -> CodecResult<&'a str> {
    required_field(map, name)?
        .as_text()
        .ok_or_else(|| CodecError::invalid_structure(format!("{name} is not text")))
}
