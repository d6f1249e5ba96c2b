//! Chain RPC collaborator.
//!
//! [`ChainRpc`] is everything the client needs from a NEAR node: the access
//! key nonce and a recent block hash to build a transaction, transaction
//! submission, the current block time and the contract's view of a channel.
//! Transport is left to implementations.
//!
//! [`InMemoryChain`] executes the payment channel contract rules locally
//! with a settable clock. It is deterministic and used for tests and
//! simulations.

use std::collections::{HashMap, VecDeque};

use paychan_channel::onchain::METHOD_CHANNEL;
use paychan_channel::{
    Account, ChannelId, FunctionCall, HARD_CLOSE_TIMEOUT, OnchainChannel, SignedState,
    build_channel_view_args,
};
use paychan_crypto::{CryptoHash, PublicKey, sha256_multi};
use paychan_types::{AccountId, Balance};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::transaction::{Action, SignedTransaction};

/// Access key state needed to build the next transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyView {
    /// Last nonce used with this key.
    pub nonce: u64,
    /// Hash of a recent final block.
    pub block_hash: CryptoHash,
}

/// Final status of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Succeeded, with the value returned by the last call.
    SuccessValue(Vec<u8>),
    /// Failed during execution.
    Failure(String),
}

/// Outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub transaction_hash: CryptoHash,
    pub status: ExecutionStatus,
    /// Timestamp of the block that executed the transaction, in nanoseconds.
    pub block_timestamp: u64,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::SuccessValue(_))
    }
}

/// Interface to a NEAR node.
///
/// Queries are read-only and idempotent. Network failures are reported as
/// [`ClientError::ChainUnavailable`]; a transaction that executed and failed
/// is reported through [`ExecutionStatus::Failure`].
#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync {
    /// Fails with [`ClientError::AccessKeyNotFound`] if the key is not
    /// registered for the account.
    async fn view_access_key(
        &self,
        account_id: &AccountId,
        public_key: &PublicKey,
    ) -> ClientResult<AccessKeyView>;

    async fn send_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> ClientResult<ExecutionOutcome>;

    /// Timestamp of the latest final block, in nanoseconds.
    async fn block_timestamp(&self) -> ClientResult<u64>;

    /// Call a contract view method with JSON `args` and return the raw
    /// result bytes.
    async fn call_view(
        &self,
        contract_id: &AccountId,
        method_name: &str,
        args: &[u8],
    ) -> ClientResult<Vec<u8>>;

    /// Call the contract's `channel(channel_id)` view.
    async fn view_channel(
        &self,
        contract_id: &AccountId,
        channel_id: &ChannelId,
    ) -> ClientResult<Option<OnchainChannel>> {
        let args = build_channel_view_args(channel_id)?;
        let result = self.call_view(contract_id, METHOD_CHANNEL, &args).await?;
        serde_json::from_slice(&result).map_err(|e| ClientError::ViewFailed {
            method: METHOD_CHANNEL.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Block time advanced by every executed transaction.
pub const BLOCK_INTERVAL: u64 = 1_000_000_000;

/// Number of submitted transactions an [`InMemoryChain`] remembers.
pub const DEFAULT_TRANSACTION_LOG_LIMIT: usize = 1024;

#[derive(Debug)]
struct ChainState {
    now: u64,
    height: u64,
    block_hash: CryptoHash,
    access_keys: HashMap<(AccountId, PublicKey), u64>,
    channels: HashMap<ChannelId, OnchainChannel>,
    balances: HashMap<AccountId, Balance>,
    faults: VecDeque<String>,
    unavailable: bool,
    transactions: VecDeque<SignedTransaction>,
}

impl ChainState {
    fn produce_block(&mut self) {
        self.height += 1;
        self.now += BLOCK_INTERVAL;
        self.block_hash = CryptoHash(sha256_multi(&[
            self.block_hash.as_bytes(),
            &self.height.to_le_bytes(),
        ]));
    }

    fn credit(&mut self, account_id: &AccountId, amount: Balance) {
        let balance = self.balances.entry(account_id.clone()).or_default();
        *balance = balance.checked_add(amount).unwrap_or(Balance::from_yocto_near(u128::MAX));
    }
}

/// Local chain running the payment channel contract rules.
#[derive(Debug)]
pub struct InMemoryChain {
    contract_id: AccountId,
    dispute_window: u64,
    transaction_log_limit: usize,
    state: Mutex<ChainState>,
}

#[derive(Deserialize)]
struct OpenArgs {
    channel_id: ChannelId,
    receiver: Account,
    sender: Account,
}

#[derive(Deserialize)]
struct ChannelIdArgs {
    channel_id: ChannelId,
}

#[derive(Deserialize)]
struct StateArgs {
    state: SignedState,
}

#[derive(Deserialize)]
struct WithdrawAndCloseArgs {
    state: SignedState,
    close: SignedState,
}

type ContractResult<T> = Result<T, String>;

impl InMemoryChain {
    pub fn new(contract_id: AccountId) -> Self {
        Self {
            contract_id,
            dispute_window: HARD_CLOSE_TIMEOUT,
            transaction_log_limit: DEFAULT_TRANSACTION_LOG_LIMIT,
            state: Mutex::new(ChainState {
                now: 0,
                height: 0,
                block_hash: CryptoHash::hash_bytes(b"genesis"),
                access_keys: HashMap::new(),
                channels: HashMap::new(),
                balances: HashMap::new(),
                faults: VecDeque::new(),
                unavailable: false,
                transactions: VecDeque::new(),
            }),
        }
    }

    /// Override the contract's dispute window.
    pub fn with_dispute_window(mut self, nanos: u64) -> Self {
        self.dispute_window = nanos;
        self
    }

    /// Keep at most `limit` submitted transactions, dropping the oldest.
    pub fn with_transaction_log_limit(mut self, limit: usize) -> Self {
        self.transaction_log_limit = limit;
        self
    }

    pub fn contract_id(&self) -> &AccountId {
        &self.contract_id
    }

    /// Register a full-access key for `account_id`.
    pub async fn add_access_key(&self, account_id: AccountId, public_key: PublicKey) {
        self.state
            .lock()
            .await
            .access_keys
            .insert((account_id, public_key), 0);
    }

    pub async fn now(&self) -> u64 {
        self.state.lock().await.now
    }

    pub async fn set_time(&self, nanos: u64) {
        self.state.lock().await.now = nanos;
    }

    pub async fn advance_time(&self, nanos: u64) {
        let mut state = self.state.lock().await;
        state.now = state.now.saturating_add(nanos);
    }

    /// Make the node unreachable (or reachable again).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Fail the next submitted transaction with `reason`, without executing it.
    pub async fn fail_next_transaction(&self, reason: impl Into<String>) {
        self.state.lock().await.faults.push_back(reason.into());
    }

    /// Amount transferred to `account_id` by the contract so far.
    pub async fn balance_of(&self, account_id: &AccountId) -> Balance {
        self.state
            .lock()
            .await
            .balances
            .get(account_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn channel(&self, channel_id: &ChannelId) -> Option<OnchainChannel> {
        self.state.lock().await.channels.get(channel_id).cloned()
    }

    /// The most recent transactions that reached the node, oldest first.
    pub async fn transactions(&self) -> Vec<SignedTransaction> {
        self.state.lock().await.transactions.iter().cloned().collect()
    }

    fn execute(
        &self,
        state: &mut ChainState,
        signer_id: &AccountId,
        call: &FunctionCall,
    ) -> ContractResult<()> {
        let now = state.now;
        match call.method_name.as_str() {
            paychan_channel::onchain::METHOD_OPEN_CHANNEL => {
                let args: OpenArgs = parse_args(call)?;
                if state.channels.contains_key(&args.channel_id) {
                    return Err("Channel already exists".into());
                }
                state.channels.insert(
                    args.channel_id,
                    OnchainChannel::opened(args.receiver, args.sender, call.deposit),
                );
                Ok(())
            }
            paychan_channel::onchain::METHOD_TOPUP => {
                let args: ChannelIdArgs = parse_args(call)?;
                let channel = open_channel_mut(state, &args.channel_id)?;
                if channel.force_close_started.is_some() {
                    return Err("Channel is closing.".into());
                }
                channel.added_balance = channel
                    .added_balance
                    .checked_add(call.deposit)
                    .ok_or("Balance overflow")?;
                Ok(())
            }
            paychan_channel::onchain::METHOD_WITHDRAW => {
                let args: StateArgs = parse_args(call)?;
                withdraw(state, &args.state)
            }
            paychan_channel::onchain::METHOD_CLOSE => {
                let args: StateArgs = parse_args(call)?;
                close(state, &args.state)
            }
            paychan_channel::onchain::METHOD_WITHDRAW_AND_CLOSE => {
                let args: WithdrawAndCloseArgs = parse_args(call)?;
                withdraw(state, &args.state)?;
                close(state, &args.close)
            }
            paychan_channel::onchain::METHOD_FORCE_CLOSE_START => {
                let args: ChannelIdArgs = parse_args(call)?;
                let channel = open_channel_mut(state, &args.channel_id)?;
                if channel.force_close_started.is_some() {
                    return Err("Channel is already closing.".into());
                }
                if signer_id != channel.sender.account_id()
                    && signer_id != channel.receiver.account_id()
                {
                    return Err("Only a channel participant can start a force close".into());
                }
                channel.force_close_started = Some(now);
                Ok(())
            }
            paychan_channel::onchain::METHOD_FORCE_CLOSE_FINISH => {
                let args: ChannelIdArgs = parse_args(call)?;
                let window = self.dispute_window;
                let channel = open_channel_mut(state, &args.channel_id)?;
                let Some(started) = channel.force_close_started else {
                    return Err("Channel is not closing.".into());
                };
                if now.saturating_sub(started) < window {
                    return Err("Channel can't be closed yet. Not enough time has passed.".into());
                }
                let refund = channel.remaining_balance();
                let sender = channel.sender.account_id().clone();
                state.channels.insert(args.channel_id, OnchainChannel::reset());
                state.credit(&sender, refund);
                Ok(())
            }
            other => Err(format!("MethodNotFound: {other}")),
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(call: &FunctionCall) -> ContractResult<T> {
    serde_json::from_slice(&call.args).map_err(|e| format!("Failed to deserialize input: {e}"))
}

fn open_channel_mut<'a>(
    state: &'a mut ChainState,
    channel_id: &ChannelId,
) -> ContractResult<&'a mut OnchainChannel> {
    match state.channels.get_mut(channel_id) {
        Some(channel) if !channel.is_reset() => Ok(channel),
        _ => Err(format!("Channel {channel_id} not found")),
    }
}

fn withdraw(state: &mut ChainState, signed: &SignedState) -> ContractResult<()> {
    let channel = open_channel_mut(state, signed.channel_id())?;
    if !signed.verify(channel.sender.public_key()) {
        return Err("Invalid signature from sender".into());
    }
    let spent = signed.spent_balance();
    if spent > channel.added_balance {
        return Err("Spent balance exceeds deposit".into());
    }
    if channel.withdrawn_balance >= spent {
        return Err("No balance to withdraw".into());
    }
    let amount = spent.saturating_sub(channel.withdrawn_balance);
    channel.withdrawn_balance = spent;
    let receiver = channel.receiver.account_id().clone();
    state.credit(&receiver, amount);
    Ok(())
}

fn close(state: &mut ChainState, signed: &SignedState) -> ContractResult<()> {
    let channel = open_channel_mut(state, signed.channel_id())?;
    if !signed.verify(channel.receiver.public_key()) {
        return Err("Invalid signature from receiver".into());
    }
    if !signed.spent_balance().is_zero() {
        return Err("Invalid payload".into());
    }
    let refund = channel.remaining_balance();
    let sender = channel.sender.account_id().clone();
    state
        .channels
        .insert(signed.channel_id().clone(), OnchainChannel::reset());
    state.credit(&sender, refund);
    Ok(())
}

#[async_trait::async_trait]
impl ChainRpc for InMemoryChain {
    async fn view_access_key(
        &self,
        account_id: &AccountId,
        public_key: &PublicKey,
    ) -> ClientResult<AccessKeyView> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(ClientError::ChainUnavailable("node unreachable".into()));
        }
        let nonce = state
            .access_keys
            .get(&(account_id.clone(), *public_key))
            .copied()
            .ok_or_else(|| ClientError::AccessKeyNotFound {
                account_id: account_id.clone(),
                public_key: *public_key,
            })?;
        Ok(AccessKeyView {
            nonce,
            block_hash: state.block_hash,
        })
    }

    async fn send_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> ClientResult<ExecutionOutcome> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(ClientError::ChainUnavailable("node unreachable".into()));
        }
        if self.transaction_log_limit > 0 {
            if state.transactions.len() == self.transaction_log_limit {
                state.transactions.pop_front();
            }
            state.transactions.push_back(signed.clone());
        }

        let tx = &signed.transaction;
        let key = (tx.signer_id.clone(), tx.public_key);
        let outcome_status = if let Some(reason) = state.faults.pop_front() {
            ExecutionStatus::Failure(reason)
        } else if !signed.verify() {
            ExecutionStatus::Failure("InvalidSignature".into())
        } else if state.access_keys.get(&key).is_none_or(|last| tx.nonce <= *last) {
            ExecutionStatus::Failure("InvalidNonce".into())
        } else if tx.receiver_id != self.contract_id {
            ExecutionStatus::Failure(format!("Unknown receiver {}", tx.receiver_id))
        } else {
            state.access_keys.insert(key, tx.nonce);
            state.produce_block();

            // Actions run against a scratch copy so a failing action leaves
            // the contract untouched.
            let mut scratch = ChainState {
                now: state.now,
                height: state.height,
                block_hash: state.block_hash,
                access_keys: HashMap::new(),
                channels: state.channels.clone(),
                balances: state.balances.clone(),
                faults: VecDeque::new(),
                unavailable: false,
                transactions: VecDeque::new(),
            };
            let mut result = Ok(());
            for action in &tx.actions {
                let Action::FunctionCall(call) = action;
                result = self.execute(&mut scratch, &tx.signer_id, call);
                if result.is_err() {
                    break;
                }
            }
            match result {
                Ok(()) => {
                    state.channels = scratch.channels;
                    state.balances = scratch.balances;
                    ExecutionStatus::SuccessValue(Vec::new())
                }
                Err(reason) => ExecutionStatus::Failure(reason),
            }
        };

        debug!(
            "Executed {} from {} at {}: {:?}",
            tx.method_name(),
            tx.signer_id,
            state.now,
            outcome_status
        );
        Ok(ExecutionOutcome {
            transaction_hash: signed.hash,
            status: outcome_status,
            block_timestamp: state.now,
        })
    }

    async fn block_timestamp(&self) -> ClientResult<u64> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(ClientError::ChainUnavailable("node unreachable".into()));
        }
        Ok(state.now)
    }

    async fn call_view(
        &self,
        contract_id: &AccountId,
        method_name: &str,
        args: &[u8],
    ) -> ClientResult<Vec<u8>> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(ClientError::ChainUnavailable("node unreachable".into()));
        }
        let view_failed = |reason: String| ClientError::ViewFailed {
            method: method_name.to_string(),
            reason,
        };
        if *contract_id != self.contract_id {
            return Err(view_failed(format!("no contract deployed at {contract_id}")));
        }
        match method_name {
            METHOD_CHANNEL => {
                let args: ChannelIdArgs = serde_json::from_slice(args)
                    .map_err(|e| view_failed(format!("Failed to deserialize input: {e}")))?;
                serde_json::to_vec(&state.channels.get(&args.channel_id))
                    .map_err(|e| view_failed(e.to_string()))
            }
            other => Err(view_failed(format!("MethodNotFound: {other}"))),
        }
    }
}
