//! The local record of one payment channel.
//!
//! # Channel Lifecycle
//!
//! 1. **Opening**: record created locally, open transaction not yet confirmed
//! 2. **Active**: payments, top-ups and withdrawals are allowed
//! 3. **ForceClosing**: one party started a unilateral close; the
//!    counterparty may still submit a higher signed state until the dispute
//!    window elapses
//! 4. **Closed**: terminal, no further mutation is accepted
//!
//! Every mutating method checks the balance invariant
//! `withdrawn_balance <= spent_balance <= added_balance` before touching
//! any field, so a failed call leaves the record exactly as it was.

use std::fmt;

use paychan_crypto::SecretKey;
use paychan_types::Balance;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::{ChannelError, ChannelResult};
use crate::state::{ChannelId, SignedState, State};

/// Channel state in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Created locally; the open transaction is not confirmed yet.
    Opening,
    /// Open on chain.
    Active,
    /// Unilateral close started; waiting for the dispute window.
    ForceClosing,
    /// Terminal.
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Opening => write!(f, "Opening"),
            ChannelStatus::Active => write!(f, "Active"),
            ChannelStatus::ForceClosing => write!(f, "ForceClosing"),
            ChannelStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// Result of applying a signed state to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Spent balance moved forward.
    Applied { previous: Balance, current: Balance },
    /// Same spent balance as already stored; nothing changed.
    Unchanged,
}

/// Authoritative local record of one payment channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChannelRecord", into = "ChannelRecord")]
pub struct Channel {
    channel_id: ChannelId,
    receiver: Account,
    sender: Account,
    sender_secret_key: Option<SecretKey>,
    added_balance: Balance,
    spent_balance: Balance,
    withdrawn_balance: Balance,
    force_close_started: Option<u64>,
    status: ChannelStatus,
    latest_state: Option<SignedState>,
}

/// Field-for-field persisted shape of [`Channel`]. Deserialized records are
/// validated before they become a `Channel`. Every field is required; absent
/// optional values are written as `null`.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelRecord {
    channel_id: ChannelId,
    receiver: Account,
    sender: Account,
    #[serde(deserialize_with = "Option::deserialize")]
    sender_secret_key: Option<SecretKey>,
    added_balance: Balance,
    spent_balance: Balance,
    withdrawn_balance: Balance,
    #[serde(deserialize_with = "Option::deserialize")]
    force_close_started: Option<u64>,
    status: ChannelStatus,
    #[serde(deserialize_with = "Option::deserialize")]
    latest_state: Option<SignedState>,
}

impl From<Channel> for ChannelRecord {
    fn from(channel: Channel) -> Self {
        Self {
            channel_id: channel.channel_id,
            receiver: channel.receiver,
            sender: channel.sender,
            sender_secret_key: channel.sender_secret_key,
            added_balance: channel.added_balance,
            spent_balance: channel.spent_balance,
            withdrawn_balance: channel.withdrawn_balance,
            force_close_started: channel.force_close_started,
            status: channel.status,
            latest_state: channel.latest_state,
        }
    }
}

impl TryFrom<ChannelRecord> for Channel {
    type Error = ChannelError;

    fn try_from(record: ChannelRecord) -> ChannelResult<Self> {
        let channel = Channel {
            channel_id: record.channel_id,
            receiver: record.receiver,
            sender: record.sender,
            sender_secret_key: record.sender_secret_key,
            added_balance: record.added_balance,
            spent_balance: record.spent_balance,
            withdrawn_balance: record.withdrawn_balance,
            force_close_started: record.force_close_started,
            status: record.status,
            latest_state: record.latest_state,
        };
        channel.validate()?;
        Ok(channel)
    }
}

impl Channel {
    /// Create the sender's record for a new channel, in `Opening` state.
    ///
    /// `balance` is the initial deposit that the open transaction will attach.
    pub fn open(
        channel_id: ChannelId,
        receiver: Account,
        sender: Account,
        sender_secret_key: SecretKey,
        balance: Balance,
    ) -> ChannelResult<Self> {
        if sender_secret_key.public_key() != *sender.public_key() {
            return Err(ChannelError::KeyMismatch);
        }
        Ok(Self {
            channel_id,
            receiver,
            sender,
            sender_secret_key: Some(sender_secret_key),
            added_balance: balance,
            spent_balance: Balance::ZERO,
            withdrawn_balance: Balance::ZERO,
            force_close_started: None,
            status: ChannelStatus::Opening,
            latest_state: None,
        })
    }

    /// Create a record for a channel opened by someone else, typically the
    /// receiver's copy after seeing the channel on chain.
    pub fn counterparty(
        channel_id: ChannelId,
        receiver: Account,
        sender: Account,
        added_balance: Balance,
    ) -> Self {
        Self {
            channel_id,
            receiver,
            sender,
            sender_secret_key: None,
            added_balance,
            spent_balance: Balance::ZERO,
            withdrawn_balance: Balance::ZERO,
            force_close_started: None,
            status: ChannelStatus::Active,
            latest_state: None,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn receiver(&self) -> &Account {
        &self.receiver
    }

    pub fn sender(&self) -> &Account {
        &self.sender
    }

    pub fn sender_secret_key(&self) -> Option<&SecretKey> {
        self.sender_secret_key.as_ref()
    }

    pub fn added_balance(&self) -> Balance {
        self.added_balance
    }

    pub fn spent_balance(&self) -> Balance {
        self.spent_balance
    }

    pub fn withdrawn_balance(&self) -> Balance {
        self.withdrawn_balance
    }

    /// Amount still available for new payments.
    pub fn available_balance(&self) -> Balance {
        self.added_balance.saturating_sub(self.spent_balance)
    }

    pub fn force_close_started(&self) -> Option<u64> {
        self.force_close_started
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn latest_state(&self) -> Option<&SignedState> {
        self.latest_state.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.status == ChannelStatus::Closed
    }

    fn ensure_not_closed(&self) -> ChannelResult<()> {
        if self.is_closed() {
            return Err(ChannelError::ChannelClosed(self.channel_id.to_string()));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: ChannelStatus, label: &'static str) -> ChannelResult<()> {
        self.ensure_not_closed()?;
        if self.status != expected {
            return Err(ChannelError::InvalidState {
                expected: label,
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Check a signed state against this channel without applying it.
    ///
    /// Order: lifecycle state, channel id, signature, deposit bound,
    /// monotonicity. An equal spent balance is a no-op. Updates are accepted
    /// while active and during a force close, when the counterparty may
    /// still submit a higher state.
    pub fn check_update(&self, signed: &SignedState) -> ChannelResult<UpdateOutcome> {
        self.ensure_not_closed()?;
        if self.status == ChannelStatus::Opening {
            return Err(ChannelError::InvalidState {
                expected: "Active",
                actual: self.status.to_string(),
            });
        }
        if signed.channel_id() != &self.channel_id {
            return Err(ChannelError::ChannelIdMismatch {
                expected: self.channel_id.to_string(),
                actual: signed.channel_id().to_string(),
            });
        }
        if !signed.verify(self.sender.public_key()) {
            return Err(ChannelError::InvalidSignature);
        }
        let provided = signed.spent_balance();
        if provided > self.added_balance {
            return Err(ChannelError::BalanceExceedsDeposit {
                spent: provided,
                added: self.added_balance,
            });
        }
        if provided < self.spent_balance {
            return Err(ChannelError::StaleUpdate {
                current: self.spent_balance,
                provided,
            });
        }
        if provided == self.spent_balance {
            return Ok(UpdateOutcome::Unchanged);
        }
        Ok(UpdateOutcome::Applied {
            previous: self.spent_balance,
            current: provided,
        })
    }

    /// Accept a signed state, moving `spent_balance` forward.
    pub fn apply_signed_state(&mut self, signed: SignedState) -> ChannelResult<UpdateOutcome> {
        let outcome = self.check_update(&signed)?;
        if let UpdateOutcome::Applied { current, .. } = outcome {
            self.spent_balance = current;
            self.latest_state = Some(signed);
        }
        Ok(outcome)
    }

    /// Sign a payment of `amount` on top of what was already spent.
    ///
    /// Does not mutate the record; the returned state is applied through
    /// the ledger like any other update.
    pub fn sign_payment(&self, amount: Balance) -> ChannelResult<SignedState> {
        self.ensure_status(ChannelStatus::Active, "Active")?;
        let secret_key = self
            .sender_secret_key
            .as_ref()
            .ok_or(ChannelError::MissingSecretKey)?;
        let spent = self
            .spent_balance
            .checked_add(amount)
            .ok_or(ChannelError::BalanceOverflow)?;
        if spent > self.added_balance {
            return Err(ChannelError::InsufficientBalance {
                available: self.available_balance(),
                required: amount,
            });
        }
        State::new(self.channel_id.clone(), spent).sign(secret_key)
    }

    /// The open transaction was confirmed.
    pub fn mark_active(&mut self) -> ChannelResult<()> {
        self.ensure_status(ChannelStatus::Opening, "Opening")?;
        self.status = ChannelStatus::Active;
        Ok(())
    }

    /// A top-up of `amount` was confirmed on chain.
    pub fn add_deposit(&mut self, amount: Balance) -> ChannelResult<()> {
        self.ensure_status(ChannelStatus::Active, "Active")?;
        self.added_balance = self
            .added_balance
            .checked_add(amount)
            .ok_or(ChannelError::BalanceOverflow)?;
        Ok(())
    }

    /// The receiver claimed funds up to `spent` on chain.
    ///
    /// Withdrawals are cumulative; a lower value than already recorded is
    /// ignored.
    pub fn record_withdrawal(&mut self, spent: Balance) -> ChannelResult<()> {
        self.ensure_not_closed()?;
        if spent > self.spent_balance {
            return Err(ChannelError::BalanceExceedsDeposit {
                spent,
                added: self.spent_balance,
            });
        }
        if spent > self.withdrawn_balance {
            self.withdrawn_balance = spent;
        }
        Ok(())
    }

    /// A unilateral close was started at chain time `started_at`.
    pub fn start_force_close(&mut self, started_at: u64) -> ChannelResult<()> {
        self.ensure_status(ChannelStatus::Active, "Active")?;
        self.force_close_started = Some(started_at);
        self.status = ChannelStatus::ForceClosing;
        Ok(())
    }

    /// Whether the dispute window has elapsed at chain time `now`.
    pub fn dispute_window_elapsed(&self, now: u64, window: u64) -> bool {
        match self.force_close_started {
            Some(started) => now.saturating_sub(started) >= window,
            None => false,
        }
    }

    /// Check that a force close may be finished at chain time `now`.
    pub fn check_finish_force_close(&self, now: u64, window: u64) -> ChannelResult<()> {
        self.ensure_status(ChannelStatus::ForceClosing, "ForceClosing")?;
        let started = self.force_close_started.ok_or_else(|| {
            ChannelError::CorruptRecord("force closing without start time".into())
        })?;
        if !self.dispute_window_elapsed(now, window) {
            return Err(ChannelError::DisputeWindowNotElapsed {
                started,
                now,
                window,
            });
        }
        Ok(())
    }

    /// Finish a force close at chain time `now`.
    pub fn finish_force_close(&mut self, now: u64, window: u64) -> ChannelResult<()> {
        self.check_finish_force_close(now, window)?;
        self.status = ChannelStatus::Closed;
        Ok(())
    }

    /// Adopt a force close that the chain reports as already started.
    pub fn adopt_force_close(&mut self, started_at: u64) -> ChannelResult<()> {
        self.ensure_not_closed()?;
        self.force_close_started = Some(started_at);
        self.status = ChannelStatus::ForceClosing;
        Ok(())
    }

    /// Mark the channel closed. Closing an already-closed channel fails.
    pub fn mark_closed(&mut self) -> ChannelResult<()> {
        self.ensure_not_closed()?;
        self.status = ChannelStatus::Closed;
        Ok(())
    }

    /// Check every structural invariant of the record.
    pub fn validate(&self) -> ChannelResult<()> {
        if self.spent_balance > self.added_balance {
            return Err(ChannelError::BalanceExceedsDeposit {
                spent: self.spent_balance,
                added: self.added_balance,
            });
        }
        if self.withdrawn_balance > self.spent_balance {
            return Err(ChannelError::CorruptRecord(format!(
                "withdrawn balance {} exceeds spent balance {}",
                self.withdrawn_balance, self.spent_balance
            )));
        }
        if let Some(secret_key) = &self.sender_secret_key
            && secret_key.public_key() != *self.sender.public_key()
        {
            return Err(ChannelError::KeyMismatch);
        }
        if self.status == ChannelStatus::ForceClosing && self.force_close_started.is_none() {
            return Err(ChannelError::CorruptRecord(
                "force closing without start time".into(),
            ));
        }
        if let Some(latest) = &self.latest_state {
            if latest.channel_id() != &self.channel_id {
                return Err(ChannelError::ChannelIdMismatch {
                    expected: self.channel_id.to_string(),
                    actual: latest.channel_id().to_string(),
                });
            }
            if latest.spent_balance() != self.spent_balance {
                return Err(ChannelError::CorruptRecord(format!(
                    "latest state spends {} but record spends {}",
                    latest.spent_balance(),
                    self.spent_balance
                )));
            }
            if !latest.verify(self.sender.public_key()) {
                return Err(ChannelError::InvalidSignature);
            }
        }
        Ok(())
    }
}
