//! Validation errors for primitive types.

use thiserror::Error;

/// Errors raised when a primitive value fails construction-time validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Account id shorter than the minimum length.
    #[error("Account id too short: {len} chars (minimum {min})")]
    AccountIdTooShort { len: usize, min: usize },

    /// Account id longer than the maximum length.
    #[error("Account id too long: {len} chars (maximum {max})")]
    AccountIdTooLong { len: usize, max: usize },

    /// Account id contains a character outside `[a-z0-9-_.]`.
    #[error("Invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    /// Two separators in a row, or a separator at either end.
    #[error("Redundant separator at position {position}")]
    RedundantSeparator { position: usize },

    /// Balance text could not be parsed as an unsigned 128-bit integer.
    #[error("Invalid balance: {0}")]
    InvalidBalance(String),

    /// Gas text could not be parsed as an unsigned 64-bit integer.
    #[error("Invalid gas: {0}")]
    InvalidGas(String),

    /// Arithmetic left the fixed-width range.
    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

/// Result type for primitive validation.
pub type ValidationResult<T> = Result<T, ValidationError>;
