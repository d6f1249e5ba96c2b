//! NEAR account identifiers.
//!
//! An account id is a human-readable chain address such as `alice.near`.
//! Validation happens once, in the constructor; an [`AccountId`] value is
//! always well formed.

use std::fmt;
use std::io;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// Minimum number of characters in an account id.
pub const MIN_ACCOUNT_ID_LEN: usize = 2;

/// Maximum number of characters in an account id.
pub const MAX_ACCOUNT_ID_LEN: usize = 64;

/// A validated NEAR account id.
///
/// Rules:
/// - length in `[2, 64]`
/// - characters in `[a-z0-9]` plus the separators `-`, `_`, `.`
/// - no two consecutive separators, and no separator at either end
///
/// # Example
/// ```
/// use paychan_types::AccountId;
///
/// let id: AccountId = "alice.near".parse().unwrap();
/// assert_eq!(id.as_str(), "alice.near");
/// assert!("a--b".parse::<AccountId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and wrap an account id.
    pub fn new(account_id: impl Into<String>) -> ValidationResult<Self> {
        let account_id = account_id.into();
        validate_account_id(&account_id)?;
        Ok(Self(account_id))
    }

    /// Wrap an account id known to be valid, such as a compile-time constant.
    ///
    /// Validity is only checked in debug builds.
    pub fn new_unchecked(account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        debug_assert!(
            validate_account_id(&account_id).is_ok(),
            "invalid account id {account_id:?}"
        );
        Self(account_id)
    }

    /// Build the implicit account id for a 32-byte public key.
    ///
    /// Implicit accounts are named by the lowercase hex encoding of the key,
    /// which always satisfies the naming rules.
    pub fn implicit(public_key: &[u8; 32]) -> Self {
        Self(hex::encode(public_key))
    }

    /// Borrow the account id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id looks like an implicit account (64 lowercase hex chars).
    pub fn is_implicit(&self) -> bool {
        self.0.len() == 64
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
    }

    /// Consume the wrapper and return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Check an account id against the NEAR naming rules.
///
/// Pure and total: always returns after a single pass over the input.
pub fn validate_account_id(account_id: &str) -> ValidationResult<()> {
    let len = account_id.chars().count();
    if len < MIN_ACCOUNT_ID_LEN {
        return Err(ValidationError::AccountIdTooShort {
            len,
            min: MIN_ACCOUNT_ID_LEN,
        });
    }
    if len > MAX_ACCOUNT_ID_LEN {
        return Err(ValidationError::AccountIdTooLong {
            len,
            max: MAX_ACCOUNT_ID_LEN,
        });
    }

    // Treat the position before the first char as a separator so a leading
    // separator is reported as redundant.
    let mut last_was_separator = true;

    for (position, ch) in account_id.chars().enumerate() {
        let is_separator = match ch {
            'a'..='z' | '0'..='9' => false,
            '-' | '_' | '.' => true,
            _ => return Err(ValidationError::InvalidCharacter { ch, position }),
        };

        if is_separator && last_was_separator {
            return Err(ValidationError::RedundantSeparator { position });
        }
        last_was_separator = is_separator;
    }

    if last_was_separator {
        return Err(ValidationError::RedundantSeparator { position: len - 1 });
    }

    Ok(())
}

impl TryFrom<String> for AccountId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for AccountId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for AccountId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Binary form: `u32` byte length followed by UTF-8. Decoding validates.
impl BorshSerialize for AccountId {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.0, writer)
    }
}

impl BorshDeserialize for AccountId {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let account_id = String::deserialize_reader(reader)?;
        Self::new(account_id).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_account_ids() {
        for id in ["alice.near", "al", "paymentchannel.testnet", "a-b_c.d", "0x00"] {
            assert!(AccountId::new(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            AccountId::new("a"),
            Err(ValidationError::AccountIdTooShort { len: 1, min: 2 })
        );
        assert!(AccountId::new("").is_err());
    }

    #[test]
    fn test_too_long() {
        let ok = "a".repeat(64);
        assert!(AccountId::new(ok).is_ok());

        let too_long = "a".repeat(65);
        assert_eq!(
            AccountId::new(too_long),
            Err(ValidationError::AccountIdTooLong { len: 65, max: 64 })
        );
    }

    #[test]
    fn test_redundant_separators() {
        assert_eq!(
            AccountId::new("a--b"),
            Err(ValidationError::RedundantSeparator { position: 2 })
        );
        assert_eq!(
            AccountId::new("-alice"),
            Err(ValidationError::RedundantSeparator { position: 0 })
        );
        assert_eq!(
            AccountId::new("alice."),
            Err(ValidationError::RedundantSeparator { position: 5 })
        );
        assert!(AccountId::new("a._b").is_err());
    }

    #[test]
    fn test_invalid_characters() {
        assert_eq!(
            AccountId::new("Alice.near"),
            Err(ValidationError::InvalidCharacter { ch: 'A', position: 0 })
        );
        assert!(AccountId::new("alice near").is_err());
        assert!(AccountId::new("alice/near").is_err());
    }

    #[test]
    fn test_implicit_detection() {
        let implicit = AccountId::new("ab".repeat(32)).unwrap();
        assert!(implicit.is_implicit());
        assert!(!AccountId::new("alice.near").unwrap().is_implicit());

        let derived = AccountId::implicit(&[0xAB; 32]);
        assert_eq!(derived, implicit);
        assert!(validate_account_id(derived.as_str()).is_ok());
        assert_eq!(AccountId::implicit(&[0x0f; 32]).as_str(), "0f".repeat(32));
    }

    #[test]
    fn test_binary_form_validates() {
        let id: AccountId = "ab.near".parse().unwrap();
        let bytes = borsh::to_vec(&id).unwrap();
        assert_eq!(bytes, [7, 0, 0, 0, b'a', b'b', b'.', b'n', b'e', b'a', b'r']);
        assert_eq!(borsh::from_slice::<AccountId>(&bytes).unwrap(), id);

        let invalid = borsh::to_vec("-bob").unwrap();
        let err = borsh::from_slice::<AccountId>(&invalid).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let id: AccountId = serde_json::from_str("\"bob.testnet\"").unwrap();
        assert_eq!(id.as_str(), "bob.testnet");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"bob.testnet\"");

        assert!(serde_json::from_str::<AccountId>("\"-bob\"").is_err());
    }
}
