//! Channel Ledger
//!
//! Durable storage of payment channel records: one record per channel,
//! keyed by channel id, replaced whole on every change.
//!
//! # Overview
//!
//! - **Single gate**: [`ChannelLedger::update_channel`] is the only way a
//!   signed state reaches storage, and it rejects bad signatures, stale
//!   states, over-spends and updates to closed channels
//! - **Per-channel locking**: mutations of one channel are serialized,
//!   different channels are independent, reads never wait
//! - **Atomic writes**: the filesystem backend writes a temporary file and
//!   renames it over the record
//! - **Pluggable storage**: [`LedgerBackend`] with in-memory and filesystem
//!   implementations
//!
//! # Modules
//!
//! - [`ledger`]: the [`ChannelLedger`] itself
//! - [`backend`]: storage backend trait and implementations
//! - [`config`]: [`LedgerConfig`]
//! - [`error`]: [`LedgerError`]
//!
//! # Example
//!
//! ```
//! use paychan_channel::{Account, State};
//! use paychan_crypto::SecretKey;
//! use paychan_ledger::ChannelLedger;
//! use paychan_types::Balance;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let ledger = ChannelLedger::in_memory();
//!
//! let sender_key = SecretKey::generate().unwrap();
//! let receiver_key = SecretKey::generate().unwrap();
//! let channel = ledger
//!     .create_channel(
//!         Account::new("bob.near".parse().unwrap(), receiver_key.public_key()),
//!         Account::new("alice.near".parse().unwrap(), sender_key.public_key()),
//!         sender_key.clone(),
//!         Balance::from_yocto_near(10),
//!     )
//!     .await
//!     .unwrap();
//!
//! // Once the open transaction is confirmed
//! ledger
//!     .commit(channel.channel_id(), |c| c.mark_active())
//!     .await
//!     .unwrap();
//!
//! let payment = State::new(channel.channel_id().clone(), Balance::from_yocto_near(3))
//!     .sign(&sender_key)
//!     .unwrap();
//! ledger.update_channel(&payment).await.unwrap();
//!
//! let stored = ledger.load_channel(channel.channel_id()).await.unwrap().unwrap();
//! assert_eq!(stored.spent_balance(), Balance::from_yocto_near(3));
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod ledger;

pub use backend::{FileSystemBackend, InMemoryBackend, LedgerBackend, RECORD_EXTENSION};
pub use config::{DEFAULT_DIR_NAME, LedgerConfig, default_root_dir};
pub use error::{LedgerError, LedgerResult};
pub use ledger::ChannelLedger;
