//! Cryptographic identity for NEAR payment channels.
//!
//! - **Ed25519**: [`SecretKey`], [`PublicKey`] and [`Signature`] value types
//! - **Text encoding**: `ed25519:<base58>` forms that round-trip exactly
//! - **Hashing**: SHA-256 and the 32-byte [`CryptoHash`]
//!
//! # Example
//!
//! ```
//! use paychan_crypto::{PublicKey, SecretKey};
//!
//! let sender = SecretKey::generate().unwrap();
//! let signature = sender.sign(b"state bytes");
//!
//! // The receiver only knows the text form of the sender's key
//! let text = sender.public_key().to_string();
//! let public: PublicKey = text.parse().unwrap();
//! assert!(public.verify(&signature, b"state bytes"));
//! ```

pub mod ed25519;
pub mod error;
pub mod hash;
pub mod keys;

pub use ed25519::{
    KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, PublicKey, SECRET_KEY_LENGTH, SIGNATURE_LENGTH, SecretKey,
    Signature,
};
pub use error::{CryptoError, CryptoResult};
pub use hash::{CryptoHash, sha256, sha256_multi};
pub use keys::KeyType;

/// Generate a cryptographically secure random 16-byte array.
///
/// Used for channel identifiers.
pub fn random_bytes_16() -> [u8; 16] {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
