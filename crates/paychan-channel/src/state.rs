//! Channel identifiers and signed balance updates.
//!
//! A [`State`] names a channel and the cumulative amount the sender has
//! authorized to the receiver. A [`SignedState`] is that state together
//! with the sender's signature over its canonical bytes, and is the only
//! artifact that moves a channel's spent balance forward.

use std::fmt;
use std::io;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use paychan_crypto::{PublicKey, SecretKey, Signature, random_bytes_16};
use paychan_types::Balance;
use serde::{Deserialize, Serialize};

use crate::codec::{self, encode_for_signing};
use crate::error::{ChannelError, ChannelResult};

/// Maximum length of a channel identifier.
pub const MAX_CHANNEL_ID_LEN: usize = 64;

/// Opaque channel identifier.
///
/// Freshly generated ids are 32 lowercase hex characters (128 random bits).
/// Ids received from elsewhere are accepted if they are 1 to 64 characters
/// drawn from `[A-Za-z0-9_-]`, which keeps them usable as file names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> ChannelResult<Self> {
        let id = id.into();
        validate_channel_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(hex::encode(random_bytes_16()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_channel_id(id: &str) -> ChannelResult<()> {
    if id.is_empty() || id.len() > MAX_CHANNEL_ID_LEN {
        return Err(ChannelError::InvalidChannelId(format!(
            "length {} outside 1..={}",
            id.len(),
            MAX_CHANNEL_ID_LEN
        )));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ChannelError::InvalidChannelId(format!(
            "invalid character {c:?} in {id:?}"
        )));
    }
    Ok(())
}

impl TryFrom<String> for ChannelId {
    type Error = ChannelError;

    fn try_from(value: String) -> ChannelResult<Self> {
        Self::new(value)
    }
}

impl FromStr for ChannelId {
    type Err = ChannelError;

    fn from_str(s: &str) -> ChannelResult<Self> {
        Self::new(s)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl BorshSerialize for ChannelId {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.0, writer)
    }
}

impl BorshDeserialize for ChannelId {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let id = String::deserialize_reader(reader)?;
        Self::new(id).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unsigned balance update for one channel.
///
/// Field order is the binary layout the contract verifies against.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(deny_unknown_fields)]
pub struct State {
    pub channel_id: ChannelId,
    pub spent_balance: Balance,
}

impl State {
    pub fn new(channel_id: ChannelId, spent_balance: Balance) -> Self {
        Self {
            channel_id,
            spent_balance,
        }
    }

    /// Sign this state's canonical encoding.
    pub fn sign(self, secret_key: &SecretKey) -> ChannelResult<SignedState> {
        let signature = secret_key.sign(&encode_for_signing(&self)?);
        Ok(SignedState {
            state: self,
            signature,
        })
    }
}

/// A [`State`] together with a signature over its canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(deny_unknown_fields)]
pub struct SignedState {
    pub state: State,
    pub signature: Signature,
}

impl SignedState {
    pub fn channel_id(&self) -> &ChannelId {
        &self.state.channel_id
    }

    pub fn spent_balance(&self) -> Balance {
        self.state.spent_balance
    }

    /// Check the signature against `public_key`. Never fails; any mismatch
    /// yields `false`.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        encode_for_signing(&self.state)
            .is_ok_and(|payload| public_key.verify(&self.signature, &payload))
    }

    /// Compact text form handed from sender to receiver.
    pub fn to_wire_form(&self) -> ChannelResult<String> {
        codec::to_wire_form(self)
    }

    pub fn from_wire_form(text: &str) -> ChannelResult<Self> {
        codec::from_wire_form(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> SecretKey {
        SecretKey::from_seed(Some(b"sender")).unwrap()
    }

    #[test]
    fn test_generated_ids_are_hex_and_unique() {
        let a = ChannelId::generate();
        let b = ChannelId::generate();
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_channel_id_validation() {
        assert!(ChannelId::new("abc-DEF_123").is_ok());
        assert!(ChannelId::new("").is_err());
        assert!(ChannelId::new("a".repeat(65)).is_err());
        assert!(ChannelId::new("../etc").is_err());
        assert!(ChannelId::new("a b").is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let key = sender();
        let signed = State::new(ChannelId::generate(), Balance::from_yocto_near(3))
            .sign(&key)
            .unwrap();
        assert!(signed.verify(&key.public_key()));

        let other = SecretKey::from_seed(Some(b"other")).unwrap();
        assert!(!signed.verify(&other.public_key()));
    }

    #[test]
    fn test_tampered_balance_fails_verification() {
        let key = sender();
        let mut signed = State::new(ChannelId::generate(), Balance::from_yocto_near(3))
            .sign(&key)
            .unwrap();
        signed.state.spent_balance = Balance::from_yocto_near(4);
        assert!(!signed.verify(&key.public_key()));
    }

    #[test]
    fn test_wire_form_is_self_describing() {
        let key = sender();
        let id = ChannelId::new("chan").unwrap();
        let signed = State::new(id, Balance::from_yocto_near(7)).sign(&key).unwrap();

        let text = signed.to_wire_form().unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["state"]["channel_id"], "chan");
        assert_eq!(json["state"]["spent_balance"], "7");
        assert!(json["signature"].as_str().unwrap().starts_with("ed25519:"));

        let back = SignedState::from_wire_form(&text).unwrap();
        assert_eq!(back, signed);
        assert!(back.verify(&key.public_key()));
    }

    #[test]
    fn test_wire_form_rejects_extra_fields() {
        let key = sender();
        let signed = State::new(ChannelId::new("chan").unwrap(), Balance::ZERO)
            .sign(&key)
            .unwrap();
        let text = format!(
            r#"{{"state":{{"channel_id":"chan","spent_balance":"0","nonce":1}},"signature":"{}"}}"#,
            signed.signature
        );
        assert!(matches!(
            SignedState::from_wire_form(&text),
            Err(ChannelError::Decode(_))
        ));
    }
}
