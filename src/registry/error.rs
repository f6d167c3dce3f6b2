//! Registry error types

use thiserror::Error;

use super::key::MediaKey;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A key component was empty
    #[error("invalid media key: {0} is empty")]
    InvalidKey(&'static str),

    /// A different live source is registered under the key
    #[error("stream {0} is registered by another source")]
    AlreadyRegistered(MediaKey),

    /// The source's ownership is held by another publisher
    #[error("stream {0} already has a publisher")]
    AlreadyPublishing(MediaKey),
}
