//! Transaction signer backed by a key held in memory.

use std::path::Path;

use paychan_channel::Account;
use paychan_crypto::{CryptoError, PublicKey, SecretKey, Signature};
use paychan_types::AccountId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// An account together with the full-access key used to sign its
/// transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemorySigner {
    account_id: AccountId,
    public_key: PublicKey,
    secret_key: SecretKey,
}

/// On-disk key file: `{"account_id": ..., "public_key": ..., "private_key": ...}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyFile {
    pub account_id: AccountId,
    pub public_key: PublicKey,
    #[serde(alias = "secret_key")]
    pub private_key: SecretKey,
}

impl InMemorySigner {
    /// Fails with `KeyMismatch` unless `public_key` derives from `secret_key`.
    pub fn new(
        account_id: AccountId,
        public_key: PublicKey,
        secret_key: SecretKey,
    ) -> ClientResult<Self> {
        if secret_key.public_key() != public_key {
            return Err(CryptoError::KeyMismatch.into());
        }
        Ok(Self {
            account_id,
            public_key,
            secret_key,
        })
    }

    pub fn from_secret_key(account_id: AccountId, secret_key: SecretKey) -> Self {
        Self {
            account_id,
            public_key: secret_key.public_key(),
            secret_key,
        }
    }

    /// Deterministic signer for `account_id`, keyed by `seed`.
    pub fn from_seed(account_id: AccountId, seed: &[u8]) -> ClientResult<Self> {
        let secret_key = SecretKey::from_seed(Some(seed))?;
        Ok(Self::from_secret_key(account_id, secret_key))
    }

    /// Signer for the implicit account owned by the key derived from `seed`.
    pub fn implicit_account_from_seed(seed: &[u8]) -> ClientResult<Self> {
        let secret_key = SecretKey::from_seed(Some(seed))?;
        let account_id = secret_key.public_key().implicit_account_id();
        Ok(Self::from_secret_key(account_id, secret_key))
    }

    pub fn from_key_file(key_file: KeyFile) -> ClientResult<Self> {
        Self::new(key_file.account_id, key_file.public_key, key_file.private_key)
    }

    /// Load a signer from a JSON key file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let key_file: KeyFile = serde_json::from_str(&text)
            .map_err(|e| ClientError::KeyFile(format!("{}: {}", path.display(), e)))?;
        let signer = Self::from_key_file(key_file)?;
        debug!("Loaded signer {} from {}", signer.account_id, path.display());
        Ok(signer)
    }

    pub fn to_key_file(&self) -> KeyFile {
        KeyFile {
            account_id: self.account_id.clone(),
            public_key: self.public_key,
            private_key: self.secret_key.clone(),
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// This signer as a channel participant.
    pub fn account(&self) -> Account {
        Account::new(self.account_id.clone(), self.public_key)
    }

    pub fn sign(&self, payload: &[u8]) -> Signature {
        self.secret_key.sign(payload)
    }
}
