//! Error types for the credential encryption layer.

use thiserror::Error;

/// Errors that can occur while encrypting or decrypting credentials.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid service configuration.
    #[error("invalid encryption configuration: {0}")]
    Config(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Payload is not a recognized wire format.
    #[error("invalid payload format: {0}")]
    InvalidFormat(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption or tag verification failed.
    #[error("decryption failed: {0}")]
    Decryption(String),
}

impl CryptoError {
    /// Whether this error means the payload itself is malformed, as
    /// opposed to a cipher-level failure on a well-formed payload.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(self, CryptoError::InvalidFormat(_))
    }
}
