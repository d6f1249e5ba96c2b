//! Channel lifecycle orchestration.
//!
//! The [`Client`] drives a channel through its lifecycle:
//!
//! 1. `open_channel` writes an `Opening` record, submits `open_channel` and
//!    activates the record once the chain confirms
//! 2. `create_payment` / `receive_payment` move the spent balance off-chain
//! 3. `topup` and `withdraw` settle deposits and claims on chain
//! 4. `close_channel`, or `start_force_close_channel` followed by
//!    `finish_force_close_channel`, end it
//!
//! Chain calls are made without holding the ledger's per-channel lock. The
//! local record changes only after the chain reports success, so a failed,
//! cancelled or timed-out call leaves it exactly as it was.

use std::sync::Arc;

use paychan_channel::{
    Account, Channel, ChannelError, ChannelId, ChannelStatus, FunctionCall, SignedState, State,
    UpdateOutcome, build_close_call, build_force_close_finish_call, build_force_close_start_call,
    build_open_channel_call, build_topup_call, build_withdraw_and_close_call, build_withdraw_call,
};
use paychan_crypto::SecretKey;
use paychan_ledger::{ChannelLedger, LedgerError};
use paychan_types::Balance;
use tracing::{debug, info, warn};

use crate::chain::{ChainRpc, ExecutionOutcome, ExecutionStatus};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::signer::InMemorySigner;
use crate::transaction::{Action, Transaction};

/// Payment channel client for one account.
///
/// The signer is the account that pays for transactions. It is required for
/// every operation that submits to the chain and for the receiver's side of
/// a cooperative close.
pub struct Client {
    config: ClientConfig,
    signer: Option<InMemorySigner>,
    ledger: Arc<ChannelLedger>,
    chain: Arc<dyn ChainRpc>,
}

impl Client {
    pub fn new(config: ClientConfig, ledger: Arc<ChannelLedger>, chain: Arc<dyn ChainRpc>) -> Self {
        Self {
            config,
            signer: None,
            ledger,
            chain,
        }
    }

    pub fn with_signer(mut self, signer: InMemorySigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn signer(&self) -> Option<&InMemorySigner> {
        self.signer.as_ref()
    }

    pub fn ledger(&self) -> &Arc<ChannelLedger> {
        &self.ledger
    }

    fn require_signer(&self) -> ClientResult<&InMemorySigner> {
        self.signer.as_ref().ok_or(ClientError::NoSigner)
    }

    async fn load_existing(&self, channel_id: &ChannelId) -> ClientResult<Channel> {
        self.ledger
            .load_channel(channel_id)
            .await?
            .ok_or_else(|| LedgerError::UnknownChannel(channel_id.clone()).into())
    }

    /// Sign and submit a single contract call, waiting for its outcome.
    async fn call(&self, call: FunctionCall) -> ClientResult<ExecutionOutcome> {
        let signer = self.require_signer()?;
        let access = self
            .chain
            .view_access_key(signer.account_id(), signer.public_key())
            .await?;

        let method = call.method_name.clone();
        let transaction = Transaction {
            signer_id: signer.account_id().clone(),
            public_key: *signer.public_key(),
            nonce: access.nonce.saturating_add(1),
            receiver_id: self.config.contract_account_id.clone(),
            block_hash: access.block_hash,
            actions: vec![Action::FunctionCall(call)],
        }
        .sign(signer)?;

        debug!(
            "Submitting {} to {} as {} (nonce {}, tx {})",
            method,
            self.config.contract_account_id,
            signer.account_id(),
            transaction.transaction.nonce,
            transaction.hash
        );
        let outcome = self.chain.send_transaction(&transaction).await?;

        match &outcome.status {
            ExecutionStatus::SuccessValue(_) => {
                debug!("{} succeeded in tx {}", method, outcome.transaction_hash);
                Ok(outcome)
            }
            ExecutionStatus::Failure(reason) => {
                warn!(
                    "{} failed in tx {}: {}",
                    method, outcome.transaction_hash, reason
                );
                Err(ClientError::TransactionRejected {
                    method,
                    reason: reason.clone(),
                })
            }
        }
    }

    /// Open a channel to `receiver` funded with `balance`.
    ///
    /// A fresh key pair is generated for the channel; the signer's account
    /// is the sender. The record is persisted as `Opening` before anything is
    /// submitted and becomes `Active` once the chain confirms. If the open
    /// transaction fails, the error is returned and the record stays in
    /// `Opening`; [`Client::get_channel`] with `update` promotes it later if
    /// the chain did in fact create the channel.
    pub async fn open_channel(&self, receiver: Account, balance: Balance) -> ClientResult<Channel> {
        let signer = self.require_signer()?;
        let channel_key = SecretKey::generate()?;
        let sender = Account::new(signer.account_id().clone(), channel_key.public_key());

        let channel = self
            .ledger
            .create_channel(receiver, sender, channel_key, balance)
            .await?;
        let channel_id = channel.channel_id().clone();

        let call = build_open_channel_call(&channel, self.config.open_gas)?;
        if let Err(err) = self.call(call).await {
            warn!("Channel {} left opening: {}", channel_id, err);
            return Err(err);
        }

        let channel = self
            .ledger
            .commit(&channel_id, |channel| channel.mark_active())
            .await?;
        info!(
            "Opened channel {} to {} with {}",
            channel_id,
            channel.receiver().account_id(),
            balance
        );
        Ok(channel)
    }

    /// Sign a payment of `amount` on top of what the channel already spent.
    ///
    /// The new state is recorded locally and returned for delivery to the
    /// receiver. Fails without changes if `amount` exceeds the available
    /// balance.
    pub async fn create_payment(
        &self,
        channel_id: &ChannelId,
        amount: Balance,
    ) -> ClientResult<SignedState> {
        let mut payment = None;
        self.ledger
            .commit(channel_id, |channel| {
                let signed = channel.sign_payment(amount)?;
                channel.apply_signed_state(signed.clone())?;
                payment = Some(signed);
                Ok(())
            })
            .await
            .map_err(|err| match err.channel_error() {
                Some(ChannelError::MissingSecretKey) => {
                    ClientError::MissingSecretKey(channel_id.clone())
                }
                _ => err.into(),
            })?;

        let payment = payment.ok_or_else(|| {
            ChannelError::CorruptRecord(format!("payment on {channel_id} was not recorded"))
        })?;
        debug!(
            "Signed payment of {} on channel {} (spent {})",
            amount,
            channel_id,
            payment.spent_balance()
        );
        Ok(payment)
    }

    /// Accept a signed state received from the sender.
    pub async fn receive_payment(&self, signed: &SignedState) -> ClientResult<UpdateOutcome> {
        Ok(self.ledger.update_channel(signed).await?)
    }

    /// Record a channel someone else opened, as seen on chain.
    ///
    /// Used by the receiver before accepting payments.
    pub async fn register_channel(&self, channel_id: &ChannelId) -> ClientResult<Channel> {
        let view = self
            .chain
            .view_channel(&self.config.contract_account_id, channel_id)
            .await?
            .filter(|view| !view.is_reset())
            .ok_or_else(|| LedgerError::UnknownChannel(channel_id.clone()))?;

        let mut channel = Channel::counterparty(
            channel_id.clone(),
            view.receiver,
            view.sender,
            view.added_balance,
        );
        if let Some(started) = view.force_close_started {
            channel.adopt_force_close(started)?;
        }
        self.ledger.insert_channel(channel.clone()).await?;
        info!(
            "Registered channel {} from {} with {}",
            channel_id,
            channel.sender().account_id(),
            channel.added_balance()
        );
        Ok(channel)
    }

    /// Deposit `amount` more into a channel the signer sends on.
    pub async fn topup(&self, channel_id: &ChannelId, amount: Balance) -> ClientResult<Channel> {
        let signer = self.require_signer()?;
        let channel = self.load_existing(channel_id).await?;
        if channel.sender().account_id() != signer.account_id() {
            return Err(ClientError::NotSender {
                channel_id: channel_id.clone(),
                account: signer.account_id().clone(),
            });
        }
        ensure_active(&channel)?;

        self.call(build_topup_call(channel_id, amount, self.config.call_gas)?)
            .await?;
        let channel = self
            .ledger
            .commit(channel_id, |channel| channel.add_deposit(amount))
            .await?;
        info!(
            "Topped up channel {} by {} (added {})",
            channel_id,
            amount,
            channel.added_balance()
        );
        Ok(channel)
    }

    /// Claim on chain everything `signed` authorizes beyond what was
    /// already withdrawn.
    ///
    /// The state is first accepted by the ledger, so a withdrawal always
    /// leaves the receipt recorded even if the chain call fails.
    pub async fn withdraw(&self, signed: &SignedState) -> ClientResult<Channel> {
        let channel_id = signed.channel_id();
        self.ledger.update_channel(signed).await?;
        let channel = self.load_existing(channel_id).await?;
        let spent = signed.spent_balance();
        if spent <= channel.withdrawn_balance() {
            return Err(ClientError::NothingToWithdraw(channel_id.clone()));
        }
        let claimed = spent.saturating_sub(channel.withdrawn_balance());

        self.call(build_withdraw_call(signed, self.config.call_gas)?)
            .await?;
        let channel = self
            .ledger
            .commit(channel_id, |channel| channel.record_withdrawal(spent))
            .await?;
        info!("Withdrew {} from channel {}", claimed, channel_id);
        Ok(channel)
    }

    /// Sign the zero-balance state the contract requires from the receiver
    /// to close a channel cooperatively.
    pub async fn create_close_request(&self, channel_id: &ChannelId) -> ClientResult<SignedState> {
        let signer = self.require_signer()?;
        let channel = self.load_existing(channel_id).await?;
        if channel.receiver().public_key() != signer.public_key() {
            return Err(ClientError::NotReceiver(channel_id.clone()));
        }
        Ok(State::new(channel_id.clone(), Balance::ZERO).sign(signer.secret_key())?)
    }

    /// Close a channel with a close request from the receiver.
    ///
    /// The contract refunds the undrawn deposit to the sender.
    pub async fn close_channel(&self, close: &SignedState) -> ClientResult<Channel> {
        let channel_id = close.channel_id();
        let channel = self.load_existing(channel_id).await?;
        check_close_request(&channel, close)?;

        self.call(build_close_call(close, self.config.call_gas)?)
            .await?;
        let channel = self
            .ledger
            .commit(channel_id, |channel| channel.mark_closed())
            .await?;
        info!("Closed channel {}", channel_id);
        Ok(channel)
    }

    /// Withdraw with `state` and close with `close` in one transaction.
    pub async fn withdraw_and_close(
        &self,
        state: &SignedState,
        close: &SignedState,
    ) -> ClientResult<Channel> {
        let channel_id = state.channel_id();
        if close.channel_id() != channel_id {
            return Err(ClientError::InvalidCloseRequest(format!(
                "close request is for channel {}, state for {}",
                close.channel_id(),
                channel_id
            )));
        }
        self.ledger.update_channel(state).await?;
        let channel = self.load_existing(channel_id).await?;
        check_close_request(&channel, close)?;
        let spent = state.spent_balance();
        if spent <= channel.withdrawn_balance() {
            return Err(ClientError::NothingToWithdraw(channel_id.clone()));
        }

        self.call(build_withdraw_and_close_call(state, close, self.config.call_gas)?)
            .await?;
        let channel = self
            .ledger
            .commit(channel_id, |channel| {
                channel.record_withdrawal(spent)?;
                channel.mark_closed()
            })
            .await?;
        info!("Withdrew {} and closed channel {}", spent, channel_id);
        Ok(channel)
    }

    /// Start a unilateral close. The dispute window runs from the block
    /// that executed the call.
    pub async fn start_force_close_channel(&self, channel_id: &ChannelId) -> ClientResult<Channel> {
        let channel = self.load_existing(channel_id).await?;
        ensure_active(&channel)?;

        let outcome = self
            .call(build_force_close_start_call(channel_id, self.config.call_gas)?)
            .await?;
        let started = outcome.block_timestamp;
        let channel = self
            .ledger
            .commit(channel_id, |channel| channel.start_force_close(started))
            .await?;
        info!("Started force close of channel {} at {}", channel_id, started);
        Ok(channel)
    }

    /// Finish a force close once the dispute window has elapsed in chain
    /// time.
    pub async fn finish_force_close_channel(
        &self,
        channel_id: &ChannelId,
    ) -> ClientResult<Channel> {
        let window = self.config.dispute_window;
        let channel = self.load_existing(channel_id).await?;
        let now = self.chain.block_timestamp().await?;
        channel.check_finish_force_close(now, window)?;

        let outcome = self
            .call(build_force_close_finish_call(channel_id, self.config.call_gas)?)
            .await?;
        let finished = outcome.block_timestamp;
        let channel = self
            .ledger
            .commit(channel_id, |channel| channel.finish_force_close(finished, window))
            .await?;
        info!("Finished force close of channel {}", channel_id);
        Ok(channel)
    }

    /// Load a channel, optionally reconciling it with the contract first.
    ///
    /// Reconciliation activates an `Opening` record the contract knows,
    /// adopts deposits, withdrawals and a force close started elsewhere, and
    /// closes the record when the contract has reset the channel.
    pub async fn get_channel(
        &self,
        channel_id: &ChannelId,
        update: bool,
    ) -> ClientResult<Option<Channel>> {
        let Some(local) = self.ledger.load_channel(channel_id).await? else {
            return Ok(None);
        };
        if !update || local.is_closed() {
            return Ok(Some(local));
        }

        let Some(view) = self
            .chain
            .view_channel(&self.config.contract_account_id, channel_id)
            .await?
        else {
            debug!("Channel {} not on chain yet", channel_id);
            return Ok(Some(local));
        };

        if view.is_reset() {
            if local.status() == ChannelStatus::Opening {
                // Never confirmed, so the reset slot is not ours.
                return Ok(Some(local));
            }
            let channel = self
                .ledger
                .commit(channel_id, |channel| channel.mark_closed())
                .await?;
            info!("Channel {} closed on chain", channel_id);
            return Ok(Some(channel));
        }

        if view.withdrawn_balance > local.spent_balance() {
            warn!(
                "Channel {} withdrew {} on chain, more than the {} spent locally",
                channel_id,
                view.withdrawn_balance,
                local.spent_balance()
            );
        }

        let channel = self
            .ledger
            .commit(channel_id, |channel| {
                if channel.status() == ChannelStatus::Opening {
                    channel.mark_active()?;
                }
                if channel.status() == ChannelStatus::Active
                    && view.added_balance > channel.added_balance()
                {
                    let topped_up = view.added_balance.saturating_sub(channel.added_balance());
                    channel.add_deposit(topped_up)?;
                }
                if view.withdrawn_balance > channel.withdrawn_balance()
                    && view.withdrawn_balance <= channel.spent_balance()
                {
                    channel.record_withdrawal(view.withdrawn_balance)?;
                }
                if let Some(started) = view.force_close_started
                    && channel.status() == ChannelStatus::Active
                {
                    channel.adopt_force_close(started)?;
                }
                Ok(())
            })
            .await?;
        if channel != local {
            info!(
                "Synced channel {} with chain ({} -> {})",
                channel_id,
                local.status(),
                channel.status()
            );
        }
        Ok(Some(channel))
    }

    /// All locally known channels, sorted by id.
    pub async fn list_channels(&self) -> ClientResult<Vec<Channel>> {
        Ok(self.ledger.list_channels().await?)
    }
}

fn ensure_active(channel: &Channel) -> ClientResult<()> {
    if channel.is_closed() {
        return Err(ChannelError::ChannelClosed(channel.channel_id().to_string()).into());
    }
    if channel.status() != ChannelStatus::Active {
        return Err(ChannelError::InvalidState {
            expected: "Active",
            actual: channel.status().to_string(),
        }
        .into());
    }
    Ok(())
}

/// A close request must be a zero state signed by the channel's receiver.
fn check_close_request(channel: &Channel, close: &SignedState) -> ClientResult<()> {
    if channel.is_closed() {
        return Err(ChannelError::ChannelClosed(channel.channel_id().to_string()).into());
    }
    if close.channel_id() != channel.channel_id() {
        return Err(ClientError::InvalidCloseRequest(format!(
            "request is for channel {}",
            close.channel_id()
        )));
    }
    if !close.spent_balance().is_zero() {
        return Err(ClientError::InvalidCloseRequest(format!(
            "spent balance must be zero, got {}",
            close.spent_balance()
        )));
    }
    if !close.verify(channel.receiver().public_key()) {
        return Err(ClientError::InvalidCloseRequest(
            "not signed by the receiver".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;

    struct Setup {
        chain: Arc<InMemoryChain>,
        alice: Client,
        bob: Client,
    }

    async fn setup() -> Setup {
        let config = ClientConfig::default();
        let chain = Arc::new(InMemoryChain::new(config.contract_account_id.clone()));
        let alice_signer =
            InMemorySigner::from_seed("alice.near".parse().unwrap(), b"alice").unwrap();
        let bob_signer = InMemorySigner::from_seed("bob.near".parse().unwrap(), b"bob").unwrap();
        for signer in [&alice_signer, &bob_signer] {
            chain
                .add_access_key(signer.account_id().clone(), *signer.public_key())
                .await;
        }
        let alice = Client::new(
            config.clone(),
            Arc::new(ChannelLedger::in_memory()),
            chain.clone(),
        )
        .with_signer(alice_signer);
        let bob = Client::new(config, Arc::new(ChannelLedger::in_memory()), chain.clone())
            .with_signer(bob_signer);
        Setup { chain, alice, bob }
    }

    #[tokio::test]
    async fn test_calls_require_signer() {
        let setup = setup().await;
        let anonymous = Client::new(
            ClientConfig::default(),
            Arc::new(ChannelLedger::in_memory()),
            setup.chain.clone(),
        );
        let receiver = setup.bob.signer().unwrap().account();
        let err = anonymous
            .open_channel(receiver, Balance::from_yocto_near(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoSigner));
        assert!(anonymous.list_channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_uses_fresh_channel_key() {
        let setup = setup().await;
        let receiver = setup.bob.signer().unwrap().account();
        let channel = setup
            .alice
            .open_channel(receiver, Balance::from_yocto_near(10))
            .await
            .unwrap();

        assert_eq!(channel.status(), ChannelStatus::Active);
        assert_eq!(channel.sender().account_id().as_str(), "alice.near");
        assert_ne!(
            channel.sender().public_key(),
            setup.alice.signer().unwrap().public_key()
        );
        let view = setup.chain.channel(channel.channel_id()).await.unwrap();
        assert_eq!(view.sender, *channel.sender());
    }

    #[tokio::test]
    async fn test_payment_over_balance_leaves_record() {
        let setup = setup().await;
        let receiver = setup.bob.signer().unwrap().account();
        let channel = setup
            .alice
            .open_channel(receiver, Balance::from_yocto_near(10))
            .await
            .unwrap();
        let id = channel.channel_id();

        setup
            .alice
            .create_payment(id, Balance::from_yocto_near(7))
            .await
            .unwrap();
        let err = setup
            .alice
            .create_payment(id, Balance::from_yocto_near(4))
            .await
            .unwrap_err();
        assert!(matches!(
            err.channel_error(),
            Some(ChannelError::InsufficientBalance { .. })
        ));
        let stored = setup.alice.get_channel(id, false).await.unwrap().unwrap();
        assert_eq!(stored.spent_balance(), Balance::from_yocto_near(7));
    }

    #[tokio::test]
    async fn test_receiver_cannot_sign_payments() {
        let setup = setup().await;
        let receiver = setup.bob.signer().unwrap().account();
        let channel = setup
            .alice
            .open_channel(receiver, Balance::from_yocto_near(10))
            .await
            .unwrap();
        let id = channel.channel_id();
        setup.bob.register_channel(id).await.unwrap();

        let err = setup
            .bob
            .create_payment(id, Balance::from_yocto_near(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingSecretKey(_)));
    }

    #[tokio::test]
    async fn test_topup_only_by_sender() {
        let setup = setup().await;
        let receiver = setup.bob.signer().unwrap().account();
        let channel = setup
            .alice
            .open_channel(receiver, Balance::from_yocto_near(10))
            .await
            .unwrap();
        let id = channel.channel_id();
        setup.bob.register_channel(id).await.unwrap();

        let err = setup
            .bob
            .topup(id, Balance::from_yocto_near(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotSender { .. }));
    }

    #[tokio::test]
    async fn test_close_request_must_come_from_receiver() {
        let setup = setup().await;
        let receiver = setup.bob.signer().unwrap().account();
        let channel = setup
            .alice
            .open_channel(receiver, Balance::from_yocto_near(10))
            .await
            .unwrap();
        let id = channel.channel_id();

        assert!(matches!(
            setup.alice.create_close_request(id).await.unwrap_err(),
            ClientError::NotReceiver(_)
        ));

        let forged = State::new(id.clone(), Balance::ZERO)
            .sign(setup.alice.signer().unwrap().secret_key())
            .unwrap();
        assert!(matches!(
            setup.alice.close_channel(&forged).await.unwrap_err(),
            ClientError::InvalidCloseRequest(_)
        ));

        setup.bob.register_channel(id).await.unwrap();
        let nonzero = State::new(id.clone(), Balance::from_yocto_near(1))
            .sign(setup.bob.signer().unwrap().secret_key())
            .unwrap();
        assert!(matches!(
            setup.alice.close_channel(&nonzero).await.unwrap_err(),
            ClientError::InvalidCloseRequest(_)
        ));
        assert_eq!(
            setup.alice.get_channel(id, false).await.unwrap().unwrap().status(),
            ChannelStatus::Active
        );
    }

    #[tokio::test]
    async fn test_get_channel_adopts_remote_force_close() {
        let setup = setup().await;
        let receiver = setup.bob.signer().unwrap().account();
        let channel = setup
            .alice
            .open_channel(receiver, Balance::from_yocto_near(10))
            .await
            .unwrap();
        let id = channel.channel_id();
        setup.bob.register_channel(id).await.unwrap();

        let started = setup.bob.start_force_close_channel(id).await.unwrap();
        assert_eq!(started.status(), ChannelStatus::ForceClosing);

        let stale = setup.alice.get_channel(id, false).await.unwrap().unwrap();
        assert_eq!(stale.status(), ChannelStatus::Active);
        let synced = setup.alice.get_channel(id, true).await.unwrap().unwrap();
        assert_eq!(synced.status(), ChannelStatus::ForceClosing);
        assert_eq!(synced.force_close_started(), started.force_close_started());
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let setup = setup().await;
        let id = ChannelId::new("missing").unwrap();
        assert!(setup.alice.get_channel(&id, true).await.unwrap().is_none());
        assert!(matches!(
            setup.bob.register_channel(&id).await.unwrap_err(),
            ClientError::Ledger(LedgerError::UnknownChannel(_))
        ));
        assert!(matches!(
            setup
                .alice
                .create_payment(&id, Balance::from_yocto_near(1))
                .await
                .unwrap_err(),
            ClientError::Ledger(LedgerError::UnknownChannel(_))
        ));
    }
}
