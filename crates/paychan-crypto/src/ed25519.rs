//! Ed25519 keys and signatures.
//!
//! Channel states are authorized by an Ed25519 signature from the sender's
//! channel key. This module wraps `ed25519-dalek` with fixed-width value types
//! that can be copied around freely, plus a [`SecretKey`] that zeroizes its
//! seed on drop.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use paychan_types::AccountId;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::sha256;

/// Length of a public key in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of a secret key seed in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Length of the expanded keypair form (seed followed by public key).
pub const KEYPAIR_LENGTH: usize = SECRET_KEY_LENGTH + PUBLIC_KEY_LENGTH;

/// Length of a signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// An Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Wrap raw public key bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create a public key from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Public key must be {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Verify a signature over `payload`.
    ///
    /// Never fails: any malformed key or signature simply yields `false`.
    pub fn verify(&self, signature: &Signature, payload: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key.verify(payload, &signature).is_ok()
    }

    /// Derive the implicit account id owned by this key.
    pub fn implicit_account_id(&self) -> AccountId {
        AccountId::implicit(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

/// An Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    /// Wrap raw signature bytes.
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the slice is not exactly 64 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidEncoding(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

/// An Ed25519 secret key.
///
/// Holds the 32-byte seed together with the derived public key. The seed is
/// zeroized on drop and never printed by `Debug`.
///
/// # Example
/// ```
/// use paychan_crypto::SecretKey;
///
/// let secret = SecretKey::from_seed(Some(b"alice")).unwrap();
/// let signature = secret.sign(b"payload");
/// assert!(secret.public_key().verify(&signature, b"payload"));
///
/// // Seeded keys are deterministic
/// let again = SecretKey::from_seed(Some(b"alice")).unwrap();
/// assert_eq!(secret.public_key(), again.public_key());
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    seed: [u8; SECRET_KEY_LENGTH],
    #[zeroize(skip)]
    public_key: PublicKey,
    // SigningKey zeroizes itself on drop.
    #[zeroize(skip)]
    signing_key: SigningKey,
}

impl SecretKey {
    /// Create a secret key from a seed, or from OS randomness when `seed` is
    /// `None`.
    ///
    /// A given seed always yields the same key: the key seed is the SHA-256
    /// digest of the caller's seed bytes.
    ///
    /// # Errors
    /// Fails only if the OS entropy source is unavailable.
    pub fn from_seed(seed: Option<&[u8]>) -> CryptoResult<Self> {
        let mut key_seed = [0u8; SECRET_KEY_LENGTH];
        match seed {
            Some(seed) => key_seed = sha256(seed),
            None => OsRng
                .try_fill_bytes(&mut key_seed)
                .map_err(|e| CryptoError::Entropy(e.to_string()))?,
        }
        let key = Self::from_bytes(key_seed);
        key_seed.zeroize();
        Ok(key)
    }

    /// Generate a new random secret key.
    pub fn generate() -> CryptoResult<Self> {
        Self::from_seed(None)
    }

    /// Create a secret key from its raw 32-byte seed.
    pub fn from_bytes(seed: [u8; SECRET_KEY_LENGTH]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = PublicKey(signing_key.verifying_key().to_bytes());
        Self {
            seed,
            public_key,
            signing_key,
        }
    }

    /// Create a secret key from the 64-byte expanded form (seed followed by
    /// public key).
    ///
    /// # Errors
    /// Returns an error if the slice has the wrong length or the embedded
    /// public key does not match the seed.
    pub fn from_keypair_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEYPAIR_LENGTH {
            return Err(CryptoError::InvalidEncoding(format!(
                "Secret key must be {} bytes, got {}",
                KEYPAIR_LENGTH,
                bytes.len()
            )));
        }
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        seed.copy_from_slice(&bytes[..SECRET_KEY_LENGTH]);
        let key = Self::from_bytes(seed);
        seed.zeroize();

        if key.public_key.as_bytes()[..] != bytes[SECRET_KEY_LENGTH..] {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(key)
    }

    /// The 64-byte expanded form (seed followed by public key).
    pub fn to_keypair_bytes(&self) -> [u8; KEYPAIR_LENGTH] {
        self.signing_key.to_keypair_bytes()
    }

    /// The public key derived from this secret key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign a payload. Ed25519 signing is deterministic.
    pub fn sign(&self, payload: &[u8]) -> Signature {
        Signature(self.signing_key.sign(payload).to_bytes())
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
