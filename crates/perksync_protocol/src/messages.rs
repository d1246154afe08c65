//! Replication messages.

use crate::codec::{
    self, expect_map, from_cbor, required_field, text_field, text_map, to_cbor, u16_field,
    CodecError, CodecResult,
};
use crate::key::UserKey;
use crate::perk::Perk;
use crate::PROTOCOL_VERSION;
use bytes::Bytes;
use ciborium::Value;
use std::collections::HashMap;

/// The three replication message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Upsert one record.
    Apply,
    /// Delete one record.
    Remove,
    /// Replace the whole mirror with a snapshot.
    Sync,
}

impl MessageType {
    /// Converts to a numeric code for CBOR encoding.
    pub fn to_code(&self) -> u8 {
        match self {
            MessageType::Apply => 1,
            MessageType::Remove => 2,
            MessageType::Sync => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MessageType::Apply),
            2 => Some(MessageType::Remove),
            3 => Some(MessageType::Sync),
            _ => None,
        }
    }
}

/// A replication message for payload type `T`.
///
/// Apply and Remove travel in both directions: from a client they are
/// requests, from the server they are broadcasts. Sync only travels from the
/// server to a single, newly connected client.
#[derive(Debug, Clone, PartialEq)]
pub enum PerkMessage<T> {
    /// Upsert the record of `subject`.
    Apply {
        /// User whose record changes.
        subject: UserKey,
        /// The new value.
        value: T,
    },
    /// Delete the record of `subject`.
    Remove {
        /// User whose record is deleted.
        subject: UserKey,
    },
    /// Full snapshot of the server's store.
    Sync {
        /// Every record the server holds.
        records: HashMap<UserKey, T>,
    },
}

impl<T> PerkMessage<T> {
    /// Returns the message kind.
    pub fn message_type(&self) -> MessageType {
        match self {
            PerkMessage::Apply { .. } => MessageType::Apply,
            PerkMessage::Remove { .. } => MessageType::Remove,
            PerkMessage::Sync { .. } => MessageType::Sync,
        }
    }

    /// Returns the subject for Apply and Remove.
    pub fn subject(&self) -> Option<UserKey> {
        match self {
            PerkMessage::Apply { subject, .. } | PerkMessage::Remove { subject } => Some(*subject),
            PerkMessage::Sync { .. } => None,
        }
    }
}

impl<T: Perk> PerkMessage<T> {
    /// Encodes to a CBOR frame.
    pub fn encode(&self) -> CodecResult<Bytes> {
        let mut pairs = vec![
            ("v", Value::Integer(PROTOCOL_VERSION.into())),
            ("perk", Value::Text(T::KIND.to_string())),
            (
                "type",
                Value::Integer(self.message_type().to_code().into()),
            ),
        ];

        match self {
            PerkMessage::Apply { subject, value } => {
                pairs.push(("subject", subject.to_value()));
                pairs.push(("value", codec::to_value(value)?));
            }
            PerkMessage::Remove { subject } => {
                pairs.push(("subject", subject.to_value()));
            }
            PerkMessage::Sync { records } => {
                pairs.push(("records", encode_records(records)?));
            }
        }

        to_cbor(&text_map(pairs)).map(Bytes::from)
    }

    /// Decodes from a CBOR frame.
    ///
    /// Fails if the frame belongs to another payload kind or protocol version.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let value = from_cbor(bytes)?;
        let map = expect_map(&value)?;
        let header = FrameHeader::from_map(map)?;

        if header.perk != T::KIND {
            return Err(CodecError::KindMismatch {
                expected: T::KIND.to_string(),
                actual: header.perk,
            });
        }

        match header.message_type {
            MessageType::Apply => Ok(PerkMessage::Apply {
                subject: UserKey::from_value(required_field(map, "subject")?)?,
                value: codec::from_value(required_field(map, "value")?)?,
            }),
            MessageType::Remove => Ok(PerkMessage::Remove {
                subject: UserKey::from_value(required_field(map, "subject")?)?,
            }),
            MessageType::Sync => Ok(PerkMessage::Sync {
                records: decode_records(required_field(map, "records")?)?,
            }),
        }
    }
}

/// Encodes records as an array of `[subject, value]` pairs sorted by subject.
pub fn encode_records<T: Perk>(records: &HashMap<UserKey, T>) -> CodecResult<Value> {
    let mut entries: Vec<(&UserKey, &T)> = records.iter().collect();
    entries.sort_by_key(|(key, _)| **key);

    let encoded: CodecResult<Vec<Value>> = entries
        .into_iter()
        .map(|(key, value)| Ok(Value::Array(vec![key.to_value(), codec::to_value(value)?])))
        .collect();

    Ok(Value::Array(encoded?))
}

/// Decodes records produced by [`encode_records`].
pub fn decode_records<T: Perk>(value: &Value) -> CodecResult<HashMap<UserKey, T>> {
    let entries = value
        .as_array()
        .ok_or_else(|| CodecError::invalid_structure("records must be an array"))?;

    entries
        .iter()
        .map(|entry| match entry.as_array().map(Vec::as_slice) {
            Some([key, value]) => Ok((UserKey::from_value(key)?, codec::from_value(value)?)),
            _ => Err(CodecError::invalid_structure(
                "record entry must be a [subject, value] pair",
            )),
        })
        .collect()
}

/// The routing header of a frame.
///
/// Peeking the header does not decode the payload, so a registry can hand
/// the frame to the manager responsible for its payload kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload kind.
    pub perk: String,
    /// Message kind.
    pub message_type: MessageType,
}

impl FrameHeader {
    /// Reads the header of an encoded frame.
    pub fn peek(bytes: &[u8]) -> CodecResult<Self> {
        let value = from_cbor(bytes)?;
        Self::from_map(expect_map(&value)?)
    }

    fn from_map(map: &[(Value, Value)]) -> CodecResult<Self> {
        let version = u16_field(map, "v")?;
        if version != PROTOCOL_VERSION {
            return Err(CodecError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote: version,
            });
        }

        let perk = text_field(map, "perk")?.to_string();

        let code = required_field(map, "type")?
            .as_integer()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| CodecError::invalid_structure("type is not a u8"))?;
        let message_type =
            MessageType::from_code(code).ok_or(CodecError::UnknownMessageType(code))?;

        Ok(Self { perk, message_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Requirement;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Title {
        text: Option<String>,
    }

    impl Perk for Title {
        const KIND: &'static str = "title";

        fn requirement(&self) -> Requirement {
            Requirement::Anyone
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Halo;

    impl Perk for Halo {
        const KIND: &'static str = "halo";

        fn requirement(&self) -> Requirement {
            Requirement::Anyone
        }
    }

    fn key(n: u8) -> UserKey {
        UserKey::from_bytes([n; 16])
    }

    fn title(text: &str) -> Title {
        Title {
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn apply_frame_decodes() {
        let message = PerkMessage::Apply {
            subject: key(1),
            value: title("Sky Captain"),
        };
        let frame = message.encode().unwrap();
        assert_eq!(PerkMessage::<Title>::decode(&frame).unwrap(), message);
    }

    #[test]
    fn sync_frame_carries_every_record() {
        let records: HashMap<UserKey, Title> = [(key(1), title("a")), (key(2), title("b"))]
            .into_iter()
            .collect();
        let frame = PerkMessage::Sync {
            records: records.clone(),
        }
        .encode()
        .unwrap();

        match PerkMessage::<Title>::decode(&frame).unwrap() {
            PerkMessage::Sync { records: decoded } => assert_eq!(decoded, records),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn sync_encoding_is_deterministic() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for n in 0..16 {
            a.insert(key(n), title("x"));
        }
        for n in (0..16).rev() {
            b.insert(key(n), title("x"));
        }
        let frame_a = PerkMessage::Sync { records: a }.encode().unwrap();
        let frame_b = PerkMessage::Sync { records: b }.encode().unwrap();
        assert_eq!(frame_a, frame_b);
    }

    #[test]
    fn header_peek_routes_by_kind() {
        let frame = PerkMessage::<Title>::Remove { subject: key(3) }
            .encode()
            .unwrap();
        let header = FrameHeader::peek(&frame).unwrap();
        assert_eq!(header.perk, "title");
        assert_eq!(header.message_type, MessageType::Remove);
    }

    #[test]
    fn other_kind_is_rejected() {
        let frame = PerkMessage::<Halo>::Remove { subject: key(3) }
            .encode()
            .unwrap();
        let err = PerkMessage::<Title>::decode(&frame).unwrap_err();
        assert!(matches!(err, CodecError::KindMismatch { .. }));
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        let frame = to_cbor(&text_map(vec![
            ("v", Value::Integer(PROTOCOL_VERSION.into())),
            ("perk", Value::Text("title".into())),
            ("type", Value::Integer(9u8.into())),
        ]))
        .unwrap();
        let err = FrameHeader::peek(&frame).unwrap_err();
        assert_eq!(err, CodecError::UnknownMessageType(9));
    }

    #[test]
    fn future_version_is_rejected() {
        let frame = to_cbor(&text_map(vec![
            ("v", Value::Integer(99u8.into())),
            ("perk", Value::Text("title".into())),
            ("type", Value::Integer(1u8.into())),
        ]))
        .unwrap();
        let err = FrameHeader::peek(&frame).unwrap_err();
        assert!(matches!(err, CodecError::VersionMismatch { remote: 99, .. }));
    }

    #[test]
    fn apply_without_value_is_rejected() {
        let frame = to_cbor(&text_map(vec![
            ("v", Value::Integer(PROTOCOL_VERSION.into())),
            ("perk", Value::Text("title".into())),
            ("type", Value::Integer(1u8.into())),
            ("subject", key(1).to_value()),
        ]))
        .unwrap();
        let err = PerkMessage::<Title>::decode(&frame).unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));
    }

    #[test]
    fn message_type_codes() {
        for ty in [MessageType::Apply, MessageType::Remove, MessageType::Sync] {
            assert_eq!(MessageType::from_code(ty.to_code()), Some(ty));
        }
        assert_eq!(MessageType::from_code(0), None);
    }

    mod fuzz {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
                let _ = FrameHeader::peek(&bytes);
                let _ = PerkMessage::<Title>::decode(&bytes);
            }

            #[test]
            fn truncated_frames_are_rejected(text in "[a-z]{1,16}", cut in 1usize..8) {
                let frame = PerkMessage::Apply { subject: key(1), value: title(&text) }
                    .encode()
                    .unwrap();
                let end = frame.len().saturating_sub(cut);
                prop_assert!(PerkMessage::<Title>::decode(&frame[..end]).is_err());
            }
        }
    }
}
