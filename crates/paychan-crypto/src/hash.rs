//! SHA-256 hashing and the chain's 32-byte hash type.

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Compute the SHA-256 digest of `data`.
///
/// # Example
/// ```
/// use paychan_crypto::sha256;
///
/// let hash = sha256(b"Hello, NEAR!");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of several slices hashed in sequence.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// A 32-byte hash as used for block and transaction references.
///
/// Text form is plain base58 with no prefix. Binary form is the 32 raw bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct CryptoHash(pub [u8; 32]);

impl CryptoHash {
    /// Hash `data` with SHA-256.
    pub fn hash_bytes(data: &[u8]) -> Self {
        Self(sha256(data))
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoHash({})", self)
    }
}

impl FromStr for CryptoHash {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::InvalidEncoding(format!("Hash: {e}")))?;
        let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidEncoding(format!("Hash must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }
}

impl Serialize for CryptoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CryptoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
