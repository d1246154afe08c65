//! User identifiers.

use crate::codec::{CodecError, CodecResult};
use ciborium::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A globally unique, stable identifier for a player account.
///
/// Every record store is keyed by `UserKey`. Keys are immutable once
/// assigned and travel on the wire as a 16-byte CBOR byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(Uuid);

impl UserKey {
    /// Wraps an existing UUID.
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a key from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Generates a fresh random key.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Encodes this key as a CBOR byte string.
    pub fn to_value(&self) -> Value {
        Value::Bytes(self.as_bytes().to_vec())
    }

    /// Decodes a key from a CBOR byte string.
    pub fn from_value(value: &Value) -> CodecResult<Self> {
        let bytes: [u8; 16] = value
            .as_bytes()
            .and_then(|b| b.as_slice().try_into().ok())
            .ok_or_else(|| CodecError::invalid_structure("user key must be 16 bytes"))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl From<Uuid> for UserKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for UserKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_roundtrip() {
        let key = UserKey::from_bytes([7u8; 16]);
        let decoded = UserKey::from_value(&key.to_value()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = UserKey::from_value(&Value::Bytes(vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));

        let err = UserKey::from_value(&Value::Text("nope".into())).unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));
    }

    #[test]
    fn display_parses_back() {
        let key = UserKey::random();
        let parsed: UserKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn random_keys_differ() {
        assert_ne!(UserKey::random(), UserKey::random());
    }
}
