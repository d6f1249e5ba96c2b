//! Error types for ledger operations.

use paychan_channel::{ChannelError, ChannelId};
use thiserror::Error;

/// Errors that can occur while reading or mutating the channel ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No record exists for the channel.
    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// A record already exists for the channel id.
    #[error("Channel already exists: {0}")]
    ChannelAlreadyExists(ChannelId),

    /// The update or record was rejected by the channel rules.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A committed transition would move a balance backwards or rewrite a
    /// closed record.
    #[error("Invalid transition for channel {channel_id}: {reason}")]
    InvalidTransition { channel_id: ChannelId, reason: String },

    /// I/O error from the storage backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// The underlying channel rule violation, if any.
    pub fn channel_error(&self) -> Option<&ChannelError> {
        match self {
            LedgerError::Channel(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
