//! Channel participants.

use borsh::{BorshDeserialize, BorshSerialize};
use paychan_crypto::PublicKey;
use paychan_types::AccountId;
use serde::{Deserialize, Serialize};

/// A channel participant: an on-chain account paired with its off-chain
/// signing key.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(deny_unknown_fields)]
pub struct Account {
    account_id: AccountId,
    public_key: PublicKey,
}

impl Account {
    pub fn new(account_id: AccountId, public_key: PublicKey) -> Self {
        Self {
            account_id,
            public_key,
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paychan_crypto::SecretKey;

    #[test]
    fn test_account_json_shape() {
        let key = SecretKey::from_seed(Some(b"alice")).unwrap();
        let account = Account::new("alice.near".parse().unwrap(), key.public_key());

        let json: serde_json::Value = serde_json::to_value(&account).unwrap();
        assert_eq!(json["account_id"], "alice.near");
        assert_eq!(json["public_key"], key.public_key().to_string());

        let back: Account = serde_json::from_value(json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_account_rejects_invalid_id() {
        let key = SecretKey::from_seed(Some(b"alice")).unwrap();
        let json = format!(
            r#"{{"account_id":"-alice","public_key":"{}"}}"#,
            key.public_key()
        );
        assert!(serde_json::from_str::<Account>(&json).is_err());
    }
}
