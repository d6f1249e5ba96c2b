//! Canonical encodings.
//!
//! Two forms are kept strictly apart:
//!
//! - The **binary form** (borsh): a compact fixed-layout encoding with no
//!   field names or padding. Integers are little-endian, strings and byte
//!   vectors carry a `u32` length prefix, options a `0`/`1` tag byte,
//!   public keys a key-type byte before their 32 bytes and signatures are
//!   64 raw bytes. The binary form of a [`State`] is the signing payload the
//!   payment channel contract hashes and verifies, so its field order is the
//!   declaration order of `State` and must not change.
//! - The **persisted form**: pretty-printed JSON for the ledger files, and
//!   compact JSON for the signed-state exchange payload. Decoding rejects
//!   unknown fields, truncated input and out-of-range numbers (balances are
//!   decimal strings checked against 128 bits, counters are JSON numbers
//!   checked against 64 bits).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ChannelError, ChannelResult};
use crate::state::State;

/// The bytes a sender signs for `state`.
pub fn encode_for_signing(state: &State) -> ChannelResult<Vec<u8>> {
    to_binary_form(state)
}

/// Binary form of `value`.
pub fn to_binary_form<T: BorshSerialize>(value: &T) -> ChannelResult<Vec<u8>> {
    borsh::to_vec(value).map_err(|e| ChannelError::Serialization(e.to_string()))
}

/// Decode a complete binary buffer, rejecting truncated input and trailing
/// bytes.
pub fn from_binary_form<T: BorshDeserialize>(bytes: &[u8]) -> ChannelResult<T> {
    borsh::from_slice(bytes).map_err(|e| ChannelError::Decode(e.to_string()))
}

/// Pretty-printed JSON used for ledger files.
pub fn to_persisted_form<T: Serialize>(value: &T) -> ChannelResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| ChannelError::Serialization(e.to_string()))
}

pub fn from_persisted_form<T: DeserializeOwned>(text: &str) -> ChannelResult<T> {
    serde_json::from_str(text).map_err(|e| ChannelError::Decode(e.to_string()))
}

/// Compact JSON used for the signed-state exchange payload.
pub fn to_wire_form<T: Serialize>(value: &T) -> ChannelResult<String> {
    serde_json::to_string(value).map_err(|e| ChannelError::Serialization(e.to_string()))
}

pub fn from_wire_form<T: DeserializeOwned>(text: &str) -> ChannelResult<T> {
    serde_json::from_str(text).map_err(|e| ChannelError::Decode(e.to_string()))
}
