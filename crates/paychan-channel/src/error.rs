//! Error types for the channel protocol core.
//!
//! This module defines the errors raised by entity construction, the
//! canonical encoder and channel state transitions.

use paychan_crypto::CryptoError;
use paychan_types::{Balance, ValidationError};
use thiserror::Error;

/// Errors that can occur while building, encoding or updating a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A primitive value failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A key or signature was malformed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Channel identifier is not a valid identifier.
    #[error("Invalid channel id: {0}")]
    InvalidChannelId(String),

    /// Canonical decoding failed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Encoding to the persisted or wire form failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Signature does not verify against the expected public key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed state carries a lower spent balance than the stored one.
    #[error("Stale update: current spent balance {current}, provided {provided}")]
    StaleUpdate { current: Balance, provided: Balance },

    /// Signed state spends more than has been deposited.
    #[error("Spent balance {spent} exceeds deposited balance {added}")]
    BalanceExceedsDeposit { spent: Balance, added: Balance },

    /// Payment would spend more than remains in the channel.
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Balance, required: Balance },

    /// Balance arithmetic left the 128-bit range.
    #[error("Balance overflow during calculation")]
    BalanceOverflow,

    /// Signed state belongs to a different channel.
    #[error("Channel ID mismatch: expected {expected}, got {actual}")]
    ChannelIdMismatch { expected: String, actual: String },

    /// Channel is closed; no further mutation is accepted.
    #[error("Channel {0} is closed")]
    ChannelClosed(String),

    /// Channel is in the wrong lifecycle state for the operation.
    #[error("Invalid channel state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    /// Force close was requested before the dispute window elapsed.
    #[error("Dispute window not elapsed: started at {started}, now {now}, window {window}")]
    DisputeWindowNotElapsed { started: u64, now: u64, window: u64 },

    /// Sender secret key does not derive the sender public key.
    #[error("Sender secret key does not match sender public key")]
    KeyMismatch,

    /// Operation needs the sender's channel key, which this record does not hold.
    #[error("Channel record holds no sender secret key")]
    MissingSecretKey,

    /// Stored record violates a channel invariant.
    #[error("Corrupt channel record: {0}")]
    CorruptRecord(String),
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
