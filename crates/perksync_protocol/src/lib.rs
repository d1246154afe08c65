//! # perksync Protocol
//!
//! Replication protocol types and CBOR codecs for perksync.
//!
//! This crate provides:
//! - `UserKey`, the stable identifier every record is keyed by
//! - The `Perk` trait and the change detector (`needs_update`)
//! - Verification gates and the `VerificationContext` they consume
//! - `PerkMessage` (Apply, Remove, Sync) and its CBOR wire encoding
//! - The in-process frame channel used as the message transport
//! - `MoaSkinPerk`, the cosmetic payload shipped with the crate
//!
//! This is a pure protocol crate: it performs no I/O of its own.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;

mod channel;
mod gate;
mod key;
mod messages;
mod moa;
mod perk;

pub use channel::{frame_channel, ChannelError, ChannelResult, FrameReceiver, FrameSender, FrameSink};
pub use codec::{CodecError, CodecResult};
pub use gate::{
    AllowAll, IdentityProvider, PerkGate, Requirement, StaticIdentities, VerificationContext,
    VerificationGate,
};
pub use key::UserKey;
pub use messages::{decode_records, encode_records, FrameHeader, MessageType, PerkMessage};
pub use moa::{MoaSkin, MoaSkinPerk};
pub use perk::{field_changed, needs_update, Perk};

/// Protocol version carried by every frame.
pub const PROTOCOL_VERSION: u16 = 1;
