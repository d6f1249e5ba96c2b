//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur while creating, parsing or using keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Text form is missing the scheme prefix, is not base58, or decodes to
    /// the wrong number of bytes.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Raw key bytes are malformed.
    #[error("Invalid key bytes: {0}")]
    InvalidKey(String),

    /// A public key does not match the one derived from the secret key.
    #[error("Public key does not match secret key")]
    KeyMismatch,

    /// The operating system entropy source failed.
    #[error("Entropy source unavailable: {0}")]
    Entropy(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
