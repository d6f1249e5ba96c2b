//! Error types for paychan-client

use paychan_channel::{ChannelError, ChannelId};
use paychan_crypto::{CryptoError, PublicKey};
use paychan_ledger::LedgerError;
use paychan_types::{AccountId, ValidationError};
use thiserror::Error;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The chain could not be reached; the call may be retried.
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    /// The key is not registered for the account. Retrying will not help
    /// until the key is added on chain.
    #[error("Access key {public_key} does not exist for {account_id}")]
    AccessKeyNotFound {
        account_id: AccountId,
        public_key: PublicKey,
    },

    /// A contract view call failed or returned something unreadable.
    #[error("View {method} failed: {reason}")]
    ViewFailed { method: String, reason: String },

    /// The chain executed the transaction and it failed.
    #[error("Transaction {method} rejected: {reason}")]
    TransactionRejected { method: String, reason: String },

    #[error("No signer configured")]
    NoSigner,

    #[error("Account {account} is not the sender of channel {channel_id}")]
    NotSender {
        channel_id: ChannelId,
        account: AccountId,
    },

    #[error("Signer key is not the receiver key of channel {0}")]
    NotReceiver(ChannelId),

    #[error("Channel {0} holds no sender secret key")]
    MissingSecretKey(ChannelId),

    #[error("Nothing to withdraw from channel {0}")]
    NothingToWithdraw(ChannelId),

    #[error("Invalid close request: {0}")]
    InvalidCloseRequest(String),

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// The channel rule violation behind this error, looking through the
    /// ledger layer.
    pub fn channel_error(&self) -> Option<&ChannelError> {
        match self {
            ClientError::Channel(err) => Some(err),
            ClientError::Ledger(err) => err.channel_error(),
            _ => None,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::ChainUnavailable(_))
    }
}

/// Result type alias
pub type ClientResult<T> = Result<T, ClientError>;
