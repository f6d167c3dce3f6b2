//! Error types
//!
//! Every failure surfaces to the connection loop as an [`Error`]; the loop
//! logs its [`ErrorCategory`] and closes the connection. Nothing retries.

use std::io;

use thiserror::Error;

pub use crate::registry::error::RegistryError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0} requires a prior connect")]
    ConnectRequired(&'static str),

    #[error("cannot accept {0}, must publish the stream first")]
    PublishRequired(&'static str),

    #[error("message type {0} is not audio or video")]
    NotMedia(u8),

    #[error("connection timed out")]
    Timeout,

    #[error("connection closed by peer")]
    ConnectionClosed,
}

/// Failure taxonomy used to decide how loudly to report a closed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or unsupported bytes from the peer
    Protocol,
    /// An operation invoked in a state or with arguments it does not accept
    Contract,
    /// A second publisher for a live stream
    Conflict,
    /// The peer tried to make us buffer more than the hard cap
    ResourceExhaustion,
    /// Socket failure, timeout or orderly close
    Transport,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_) | Error::Timeout | Error::ConnectionClosed => ErrorCategory::Transport,
            Error::Handshake(_) | Error::Media(_) => ErrorCategory::Protocol,
            Error::Protocol(ProtocolError::BacklogExceeded { .. }) => {
                ErrorCategory::ResourceExhaustion
            }
            Error::Protocol(_) => ErrorCategory::Protocol,
            Error::Amf(AmfError::NotAnObject(_)) => ErrorCategory::Contract,
            Error::Amf(_) => ErrorCategory::Protocol,
            Error::Registry(RegistryError::InvalidKey(_)) => ErrorCategory::Contract,
            Error::Registry(_) => ErrorCategory::Conflict,
            Error::ConnectRequired(_) | Error::PublishRequired(_) | Error::NotMedia(_) => {
                ErrorCategory::Contract
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unsupported RTMP version {0}, expected 3")]
    InvalidVersion(u8),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message of {length} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { length: u32, limit: u32 },

    #[error("{pending} bytes of partial messages exceed the {limit} byte limit")]
    BacklogExceeded { pending: usize, limit: usize },

    #[error("invalid chunk size {0}")]
    InvalidChunkSize(u32),

    #[error("chunk stream {0} continues a message it never started")]
    MissingChunkContext(u32),

    #[error("truncated {kind} control message ({len} bytes)")]
    TruncatedControl { kind: &'static str, len: usize },

    #[error("AMF3 encoded messages are not supported")]
    Amf3Unsupported,
}

#[derive(Debug, Error)]
pub enum AmfError {
    #[error("unexpected end of AMF data")]
    UnexpectedEof,

    #[error("unknown AMF0 marker 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("expected {expected}, found marker 0x{found:02x}")]
    UnexpectedMarker { expected: &'static str, found: u8 },

    #[error("object end marker missing")]
    InvalidObjectEnd,

    #[error("invalid UTF-8 in AMF string")]
    InvalidUtf8,

    #[error("nesting too deep")]
    NestingTooDeep,

    #[error("AMF3 values are not supported")]
    Amf3Unsupported,

    #[error("cannot use a {0} value as an object")]
    NotAnObject(&'static str),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("cannot initialize tracks from empty metadata")]
    EmptyMetadata,

    #[error("video codec id {0} is not supported, only H.264 (7)")]
    UnsupportedVideoCodec(u8),

    #[error("audio codec id {0} is not supported, only AAC (10)")]
    UnsupportedAudioCodec(u8),

    #[error("{kind} tag too short ({len} bytes)")]
    TruncatedTag { kind: &'static str, len: usize },

    #[error("invalid AAC config: {0}")]
    InvalidAacConfig(&'static str),

    #[error("invalid AVC decoder configuration: {0}")]
    InvalidAvcConfig(&'static str),

    #[error("{0} frame received before its sequence header")]
    TrackNotConfigured(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MediaKey;

    #[test]
    fn test_categories() {
        let io = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(io.category(), ErrorCategory::Transport);

        let version = Error::from(HandshakeError::InvalidVersion(6));
        assert_eq!(version.category(), ErrorCategory::Protocol);

        let too_large = Error::from(ProtocolError::MessageTooLarge {
            length: 1 << 30,
            limit: 1 << 24,
        });
        assert_eq!(too_large.category(), ErrorCategory::Protocol);

        let backlog = Error::from(ProtocolError::BacklogExceeded {
            pending: 10,
            limit: 5,
        });
        assert_eq!(backlog.category(), ErrorCategory::ResourceExhaustion);

        let not_object = Error::from(AmfError::NotAnObject("number"));
        assert_eq!(not_object.category(), ErrorCategory::Contract);

        let key = MediaKey::new("RTMP", "a.com", "live", "s").unwrap();
        let conflict = Error::from(RegistryError::AlreadyPublishing(key));
        assert_eq!(conflict.category(), ErrorCategory::Conflict);

        assert_eq!(
            Error::PublishRequired("video").category(),
            ErrorCategory::Contract
        );
    }

    #[test]
    fn test_display() {
        let err = Error::from(HandshakeError::InvalidVersion(6));
        assert_eq!(
            err.to_string(),
            "handshake error: unsupported RTMP version 6, expected 3"
        );
    }
}
