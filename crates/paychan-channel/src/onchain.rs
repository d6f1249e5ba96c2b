//! Payment channel contract interface.
//!
//! Builders for every contract method, producing a [`FunctionCall`] whose
//! arguments are the JSON the contract expects, plus the contract's view
//! of a channel ([`OnchainChannel`]).
//!
//! # Contract methods
//!
//! - `open_channel` - create a channel, the attached deposit becomes its balance
//! - `topup` - add the attached deposit to an open channel
//! - `withdraw` - receiver claims up to a sender-signed spent balance
//! - `close` - cooperative close with a receiver-signed zero state
//! - `withdraw_and_close` - both of the above in one call
//! - `force_close_start` - begin the dispute window
//! - `force_close_finish` - refund the sender once the window elapsed
//! - `channel` - view a channel record

use borsh::{BorshDeserialize, BorshSerialize};
use paychan_crypto::PublicKey;
use paychan_types::{AccountId, Balance, Gas};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::account::Account;
use crate::channel::Channel;
use crate::error::{ChannelError, ChannelResult};
use crate::state::{ChannelId, SignedState};

pub const METHOD_OPEN_CHANNEL: &str = "open_channel";
pub const METHOD_TOPUP: &str = "topup";
pub const METHOD_WITHDRAW: &str = "withdraw";
pub const METHOD_CLOSE: &str = "close";
pub const METHOD_WITHDRAW_AND_CLOSE: &str = "withdraw_and_close";
pub const METHOD_FORCE_CLOSE_START: &str = "force_close_start";
pub const METHOD_FORCE_CLOSE_FINISH: &str = "force_close_finish";
pub const METHOD_CHANNEL: &str = "channel";

/// Contract account on mainnet.
pub const CONTRACT_ACCOUNT_ID_MAINNET: &str = "paymentchannel.near";

/// Contract account on testnet.
pub const CONTRACT_ACCOUNT_ID_TESTNET: &str = "paymentchannel.testnet";

const SECOND: u64 = 1_000_000_000;
const DAY: u64 = 24 * 60 * 60 * SECOND;

/// Dispute window enforced by the contract, in nanoseconds of block time.
pub const HARD_CLOSE_TIMEOUT: u64 = 7 * DAY;

/// Account id the contract writes into a channel slot once it is closed.
/// The slot is kept so the id can never be reused.
pub const RESET_ACCOUNT_ID: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// A single contract method invocation.
///
/// The binary form is the chain's function call action body, in field order.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FunctionCall {
    pub method_name: String,
    /// JSON-encoded arguments.
    pub args: Vec<u8>,
    pub gas: Gas,
    pub deposit: Balance,
}

impl FunctionCall {
    fn new(
        method_name: &str,
        args: serde_json::Value,
        gas: Gas,
        deposit: Balance,
    ) -> ChannelResult<Self> {
        let args =
            serde_json::to_vec(&args).map_err(|e| ChannelError::Serialization(e.to_string()))?;
        Ok(Self {
            method_name: method_name.to_string(),
            args,
            gas,
            deposit,
        })
    }

    #[cfg(test)]
    fn args_json(&self) -> ChannelResult<serde_json::Value> {
        serde_json::from_slice(&self.args).map_err(|e| ChannelError::Decode(e.to_string()))
    }
}

/// `open_channel(channel_id, receiver, sender)` with the channel's initial
/// balance attached.
pub fn build_open_channel_call(channel: &Channel, gas: Gas) -> ChannelResult<FunctionCall> {
    FunctionCall::new(
        METHOD_OPEN_CHANNEL,
        json!({
            "channel_id": channel.channel_id(),
            "receiver": channel.receiver(),
            "sender": channel.sender(),
        }),
        gas,
        channel.added_balance(),
    )
}

pub fn build_topup_call(
    channel_id: &ChannelId,
    amount: Balance,
    gas: Gas,
) -> ChannelResult<FunctionCall> {
    FunctionCall::new(METHOD_TOPUP, json!({ "channel_id": channel_id }), gas, amount)
}

/// `withdraw(state)` with a sender-signed state.
pub fn build_withdraw_call(state: &SignedState, gas: Gas) -> ChannelResult<FunctionCall> {
    FunctionCall::new(METHOD_WITHDRAW, json!({ "state": state }), gas, Balance::ZERO)
}

/// `close(state)` with a receiver-signed zero state.
pub fn build_close_call(close: &SignedState, gas: Gas) -> ChannelResult<FunctionCall> {
    FunctionCall::new(METHOD_CLOSE, json!({ "state": close }), gas, Balance::ZERO)
}

pub fn build_withdraw_and_close_call(
    state: &SignedState,
    close: &SignedState,
    gas: Gas,
) -> ChannelResult<FunctionCall> {
    FunctionCall::new(
        METHOD_WITHDRAW_AND_CLOSE,
        json!({ "state": state, "close": close }),
        gas,
        Balance::ZERO,
    )
}

pub fn build_force_close_start_call(
    channel_id: &ChannelId,
    gas: Gas,
) -> ChannelResult<FunctionCall> {
    FunctionCall::new(
        METHOD_FORCE_CLOSE_START,
        json!({ "channel_id": channel_id }),
        gas,
        Balance::ZERO,
    )
}

pub fn build_force_close_finish_call(
    channel_id: &ChannelId,
    gas: Gas,
) -> ChannelResult<FunctionCall> {
    FunctionCall::new(
        METHOD_FORCE_CLOSE_FINISH,
        json!({ "channel_id": channel_id }),
        gas,
        Balance::ZERO,
    )
}

/// Arguments for the `channel(channel_id)` view.
pub fn build_channel_view_args(channel_id: &ChannelId) -> ChannelResult<Vec<u8>> {
    serde_json::to_vec(&json!({ "channel_id": channel_id }))
        .map_err(|e| ChannelError::Serialization(e.to_string()))
}

/// The contract's record of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainChannel {
    pub receiver: Account,
    pub sender: Account,
    pub added_balance: Balance,
    pub withdrawn_balance: Balance,
    pub force_close_started: Option<u64>,
}

impl OnchainChannel {
    /// Record as written by `open_channel`.
    pub fn opened(receiver: Account, sender: Account, deposit: Balance) -> Self {
        Self {
            receiver,
            sender,
            added_balance: deposit,
            withdrawn_balance: Balance::ZERO,
            force_close_started: None,
        }
    }

    /// The placeholder the contract leaves behind after a close.
    pub fn reset() -> Self {
        let zero = Account::new(
            AccountId::implicit(&[0u8; 32]),
            PublicKey::from_bytes([0u8; 32]),
        );
        Self::opened(zero.clone(), zero, Balance::ZERO)
    }

    /// Whether this is the placeholder of a closed channel.
    pub fn is_reset(&self) -> bool {
        self.sender.account_id().as_str() == RESET_ACCOUNT_ID
            && self.receiver.account_id().as_str() == RESET_ACCOUNT_ID
    }

    /// Balance the sender gets back when the channel is closed now.
    pub fn remaining_balance(&self) -> Balance {
        self.added_balance.saturating_sub(self.withdrawn_balance)
    }
}
