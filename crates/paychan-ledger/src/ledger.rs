//! The channel ledger.
//!
//! Every check that protects the balance invariant runs here, at the single
//! place where records are written: signatures, deposit bounds,
//! monotonicity and the terminal state. Mutations of one channel are
//! serialized by a per-channel lock; different channels proceed in
//! parallel, and reads never take a lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use paychan_channel::{
    Account, Channel, ChannelId, ChannelResult, SignedState, UpdateOutcome, from_persisted_form,
    to_persisted_form,
};
use paychan_crypto::SecretKey;
use paychan_types::Balance;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::backend::{FileSystemBackend, InMemoryBackend, LedgerBackend};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

type LockMap = StdMutex<HashMap<ChannelId, Arc<Mutex<()>>>>;

/// Durable map from channel id to [`Channel`].
pub struct ChannelLedger {
    backend: Arc<dyn LedgerBackend>,
    locks: Arc<LockMap>,
}

/// Exclusive hold on one channel.
///
/// The lock map entry lives only while someone holds or waits for it, so
/// ids of channels that do not exist leave nothing behind.
struct ChannelGuard {
    locks: Arc<LockMap>,
    channel_id: ChannelId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts.
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(&self.channel_id)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&self.channel_id);
        }
    }
}

impl ChannelLedger {
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self {
            backend,
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Ledger that keeps records in memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Ledger backed by one file per channel under `config.root_dir`.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let backend = FileSystemBackend::with_config(config).await?;
        Ok(Self::new(Arc::new(backend)))
    }

    async fn lock_channel(&self, channel_id: &ChannelId) -> ChannelGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(channel_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let mut guard = ChannelGuard {
            locks: self.locks.clone(),
            channel_id: channel_id.clone(),
            guard: None,
        };
        guard.guard = Some(lock.lock_owned().await);
        guard
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn read(&self, channel_id: &ChannelId) -> LedgerResult<Option<Channel>> {
        let Some(text) = self.backend.read_record(channel_id).await? else {
            return Ok(None);
        };
        let channel: Channel = from_persisted_form(&text)?;
        if channel.channel_id() != channel_id {
            return Err(LedgerError::InvalidTransition {
                channel_id: channel_id.clone(),
                reason: format!("record holds channel {}", channel.channel_id()),
            });
        }
        Ok(Some(channel))
    }

    async fn read_existing(&self, channel_id: &ChannelId) -> LedgerResult<Channel> {
        self.read(channel_id)
            .await?
            .ok_or_else(|| LedgerError::UnknownChannel(channel_id.clone()))
    }

    async fn write(&self, channel: &Channel) -> LedgerResult<()> {
        let text = to_persisted_form(channel)?;
        self.backend.write_record(channel.channel_id(), &text).await
    }

    /// Create and persist a new sender-side channel with a fresh id.
    ///
    /// The record starts in `Opening` with nothing spent.
    pub async fn create_channel(
        &self,
        receiver: Account,
        sender: Account,
        sender_secret_key: SecretKey,
        balance: Balance,
    ) -> LedgerResult<Channel> {
        let channel = Channel::open(
            ChannelId::generate(),
            receiver,
            sender,
            sender_secret_key,
            balance,
        )?;
        self.insert_channel(channel.clone()).await?;
        info!(
            "Created channel {} from {} to {} with {}",
            channel.channel_id(),
            channel.sender().account_id(),
            channel.receiver().account_id(),
            channel.added_balance()
        );
        Ok(channel)
    }

    /// Persist a channel built elsewhere, such as the receiver's copy of a
    /// channel it was told about. Never overwrites.
    pub async fn insert_channel(&self, channel: Channel) -> LedgerResult<()> {
        channel.validate()?;
        let _guard = self.lock_channel(channel.channel_id()).await;
        let text = to_persisted_form(&channel)?;
        self.backend
            .create_record(channel.channel_id(), &text)
            .await?;
        debug!("Inserted channel {}", channel.channel_id());
        Ok(())
    }

    /// Load a channel, `None` if there is no record for it.
    pub async fn load_channel(&self, channel_id: &ChannelId) -> LedgerResult<Option<Channel>> {
        self.read(channel_id).await
    }

    /// All persisted channels, sorted by id.
    pub async fn list_channels(&self) -> LedgerResult<Vec<Channel>> {
        let mut channels = Vec::new();
        for channel_id in self.backend.list_ids().await? {
            // A record deleted between listing and reading is skipped.
            if let Some(channel) = self.read(&channel_id).await? {
                channels.push(channel);
            }
        }
        Ok(channels)
    }

    /// Accept a signed state for its channel.
    ///
    /// Rejects unknown channels, closed channels, bad signatures, states
    /// spending more than the deposit and stale states. A state equal to
    /// the stored one is accepted as a no-op.
    pub async fn update_channel(&self, signed: &SignedState) -> LedgerResult<UpdateOutcome> {
        let channel_id = signed.channel_id();
        let _guard = self.lock_channel(channel_id).await;

        let mut channel = self.read_existing(channel_id).await?;
        let outcome = match channel.apply_signed_state(signed.clone()) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Rejected update for channel {}: {}", channel_id, err);
                return Err(err.into());
            }
        };

        match outcome {
            UpdateOutcome::Applied { previous, current } => {
                channel.validate()?;
                self.write(&channel).await?;
                info!(
                    "Channel {} spent balance {} -> {}",
                    channel_id, previous, current
                );
            }
            UpdateOutcome::Unchanged => {
                debug!(
                    "Ignored replayed state for channel {} at {}",
                    channel_id,
                    signed.spent_balance()
                );
            }
        }
        Ok(outcome)
    }

    /// Apply a whole-record transition under the channel's lock.
    ///
    /// `f` mutates a copy of the stored record. The result is persisted only
    /// if `f` succeeds, the record still satisfies its invariants, and no
    /// balance moved backwards. Returns the committed record.
    pub async fn commit<F>(&self, channel_id: &ChannelId, f: F) -> LedgerResult<Channel>
    where
        F: FnOnce(&mut Channel) -> ChannelResult<()> + Send,
    {
        let _guard = self.lock_channel(channel_id).await;

        let current = self.read_existing(channel_id).await?;
        let mut next = current.clone();
        f(&mut next)?;
        check_transition(&current, &next)?;

        if next != current {
            self.write(&next).await?;
            debug!(
                "Committed channel {} ({} -> {})",
                channel_id,
                current.status(),
                next.status()
            );
        }
        Ok(next)
    }

    /// Remove a channel record. Returns whether it existed.
    pub async fn delete_channel(&self, channel_id: &ChannelId) -> LedgerResult<bool> {
        let removed = {
            let _guard = self.lock_channel(channel_id).await;
            self.backend.delete_record(channel_id).await?
        };
        if removed {
            info!("Deleted channel {}", channel_id);
        }
        Ok(removed)
    }
}

fn check_transition(current: &Channel, next: &Channel) -> LedgerResult<()> {
    let invalid = |reason: String| LedgerError::InvalidTransition {
        channel_id: current.channel_id().clone(),
        reason,
    };

    next.validate()?;
    if current.is_closed() && next != current {
        return Err(invalid("record is closed".into()));
    }
    if next.channel_id() != current.channel_id()
        || next.sender() != current.sender()
        || next.receiver() != current.receiver()
    {
        return Err(invalid("channel identity changed".into()));
    }
    if next.spent_balance() < current.spent_balance() {
        return Err(invalid(format!(
            "spent balance decreased from {} to {}",
            current.spent_balance(),
            next.spent_balance()
        )));
    }
    if next.added_balance() < current.added_balance() {
        return Err(invalid(format!(
            "added balance decreased from {} to {}",
            current.added_balance(),
            next.added_balance()
        )));
    }
    if next.withdrawn_balance() < current.withdrawn_balance() {
        return Err(invalid(format!(
            "withdrawn balance decreased from {} to {}",
            current.withdrawn_balance(),
            next.withdrawn_balance()
        )));
    }
    Ok(())
}
