//! Error types for the client.

use perksync_protocol::{ChannelError, CodecError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur on the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A server frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No outbound sink is attached.
    #[error("not connected to server")]
    NotConnected,

    /// The outbound sink is closed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// No client is registered for the frame's payload kind.
    #[error("unknown perk kind: {0}")]
    UnknownPerk(String),

    /// A client for this payload kind is already registered.
    #[error("perk kind registered twice: {0}")]
    DuplicatePerk(&'static str),

    /// Reading or writing the customizations file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The customizations file is not valid JSON.
    #[error("invalid customizations: {0}")]
    Customizations(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns true if the operation may succeed after reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::NotConnected | ClientError::Channel(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::NotConnected.is_retryable());
        assert!(ClientError::Channel(ChannelError::Closed).is_retryable());
        assert!(!ClientError::UnknownPerk("halo".into()).is_retryable());
        assert!(!ClientError::DuplicatePerk("moa_skin").is_retryable());
        assert!(!ClientError::Codec(CodecError::UnknownMessageType(7)).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ClientError::NotConnected.to_string(),
            "not connected to server"
        );
        assert!(ClientError::UnknownPerk("halo".into())
            .to_string()
            .contains("halo"));
    }
}
