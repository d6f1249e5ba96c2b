//! NEAR Payment Channels - off-chain balance updates backed by an on-chain deposit
//!
//! This crate holds the protocol core shared by the sender and the receiver:
//! the channel record, the signed balance updates exchanged off-chain, their
//! canonical encodings and the calls understood by the payment channel
//! contract.
//!
//! # Overview
//!
//! A sender opens a channel by depositing funds with the contract. From then
//! on every payment is a [`SignedState`]: the channel id plus the cumulative
//! amount spent so far, signed with the sender's channel key. The receiver
//! keeps the highest valid one and submits it on chain to withdraw.
//!
//! # Channel Lifecycle
//!
//! 1. **Opening**: record created, waiting for the open transaction
//! 2. **Active**: payments, top-ups and withdrawals
//! 3. **ForceClosing**: unilateral close started, dispute window running
//! 4. **Closed**: terminal
//!
//! # Example: Basic Payment
//!
//! ```
//! use paychan_channel::{Account, Channel, ChannelId, UpdateOutcome};
//! use paychan_crypto::SecretKey;
//! use paychan_types::Balance;
//!
//! let sender_key = SecretKey::generate().unwrap();
//! let receiver_key = SecretKey::generate().unwrap();
//!
//! let mut channel = Channel::open(
//!     ChannelId::generate(),
//!     Account::new("bob.near".parse().unwrap(), receiver_key.public_key()),
//!     Account::new("alice.near".parse().unwrap(), sender_key.public_key()),
//!     sender_key,
//!     Balance::from_yocto_near(10),
//! )
//! .unwrap();
//! channel.mark_active().unwrap();
//!
//! // Sender pays 3 and hands the wire form to the receiver
//! let payment = channel.sign_payment(Balance::from_yocto_near(3)).unwrap();
//! let wire = payment.to_wire_form().unwrap();
//!
//! let received = paychan_channel::SignedState::from_wire_form(&wire).unwrap();
//! assert!(matches!(
//!     channel.apply_signed_state(received).unwrap(),
//!     UpdateOutcome::Applied { .. }
//! ));
//! assert_eq!(channel.spent_balance(), Balance::from_yocto_near(3));
//! ```

pub mod account;
pub mod channel;
pub mod codec;
pub mod error;
pub mod onchain;
pub mod state;

pub use account::Account;
pub use channel::{Channel, ChannelStatus, UpdateOutcome};
pub use codec::{
    encode_for_signing, from_binary_form, from_persisted_form, from_wire_form, to_binary_form,
    to_persisted_form, to_wire_form,
};
pub use error::{ChannelError, ChannelResult};
pub use onchain::{
    CONTRACT_ACCOUNT_ID_MAINNET, CONTRACT_ACCOUNT_ID_TESTNET, FunctionCall, HARD_CLOSE_TIMEOUT,
    OnchainChannel, build_channel_view_args, build_close_call, build_force_close_finish_call,
    build_force_close_start_call, build_open_channel_call, build_topup_call,
    build_withdraw_and_close_call, build_withdraw_call,
};
pub use state::{ChannelId, SignedState, State};
