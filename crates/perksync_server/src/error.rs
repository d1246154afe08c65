//! Error types for the replication server.

use crate::connections::ConnectionId;
use perksync_protocol::{ChannelError, CodecError, MessageType};
use perksync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the replication server.
///
/// An ineligible Apply request is not an error: it is dropped silently and
/// reported to the local caller as [`ApplyOutcome::Ineligible`](crate::ApplyOutcome).
#[derive(Error, Debug)]
pub enum ServerError {
    /// A client frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A client sent a message kind only the server may send.
    #[error("unexpected {0:?} message from client")]
    UnexpectedMessage(MessageType),

    /// No manager is registered for the frame's payload kind.
    #[error("unknown perk kind: {0}")]
    UnknownPerk(String),

    /// A frame arrived on a connection that never connected.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Two managers were registered for the same payload kind.
    #[error("perk kind registered twice: {0}")]
    DuplicatePerk(&'static str),

    /// Loading or saving records failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A connection's sink is closed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl ServerError {
    /// Returns true if the error was caused by what a client sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Codec(_)
                | ServerError::UnexpectedMessage(_)
                | ServerError::UnknownPerk(_)
                | ServerError::UnknownConnection(_)
        )
    }

    /// Returns true if the error is the server's own fault.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::DuplicatePerk(_) | ServerError::Persistence(_) | ServerError::Channel(_)
        )
    }
}
