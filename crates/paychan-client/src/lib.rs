//! NEAR payment channel client
//!
//! This crate drives payment channels against the on-chain contract:
//! - Client: open, pay, top up, withdraw, close and force close
//! - Chain collaborator: the `ChainRpc` trait and an in-memory chain
//! - Transactions: contract calls signed by an `InMemorySigner`
//! - Configuration: network, contract account, gas and dispute window

pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod signer;
pub mod transaction;

// Re-exports
pub use chain::{AccessKeyView, ChainRpc, ExecutionOutcome, ExecutionStatus, InMemoryChain};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_CALL_GAS, DEFAULT_OPEN_GAS, Network};
pub use error::{ClientError, ClientResult};
pub use signer::{InMemorySigner, KeyFile};
pub use transaction::{Action, SignedTransaction, Transaction};
