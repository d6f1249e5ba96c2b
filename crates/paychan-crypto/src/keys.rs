//! Canonical encodings of keys and signatures.
//!
//! In text every value is written as a scheme tag followed by the base58
//! encoding of its raw bytes, e.g. `ed25519:8W6Q...`. Parsing checks the tag
//! and the decoded width, so `to_string` and `from_str` are exact inverses.
//!
//! In binary (borsh) a public key is its key-type byte followed by the 32 key
//! bytes, and a signature is its 64 raw bytes with no tag.

use std::fmt;
use std::io;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ed25519::{
    KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, PublicKey, SIGNATURE_LENGTH, SecretKey, Signature,
};
use crate::error::{CryptoError, CryptoResult};

/// Signature schemes understood by the channel protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyType {
    /// Ed25519, tag `ed25519`, binary discriminant 0.
    Ed25519 = 0,
}

impl KeyType {
    /// Text prefix including the trailing colon.
    pub const fn prefix(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ed25519:",
        }
    }

    /// Binary discriminant used by the canonical encoder.
    pub const fn discriminant(&self) -> u8 {
        *self as u8
    }

    /// Look up a key type from its binary discriminant.
    pub fn from_discriminant(value: u8) -> Option<Self> {
        match value {
            0 => Some(KeyType::Ed25519),
            _ => None,
        }
    }
}

/// Decode `<prefix><base58>` into exactly `width` bytes.
fn decode_prefixed(s: &str, key_type: KeyType, width: usize, what: &str) -> CryptoResult<Vec<u8>> {
    let body = s.strip_prefix(key_type.prefix()).ok_or_else(|| {
        let prefix = key_type.prefix();
        CryptoError::InvalidEncoding(format!("{what} is missing the '{prefix}' prefix"))
    })?;

    let bytes = bs58::decode(body)
        .into_vec()
        .map_err(|e| CryptoError::InvalidEncoding(format!("{what}: {e}")))?;

    if bytes.len() != width {
        return Err(CryptoError::InvalidEncoding(format!(
            "{what} must decode to {width} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn encode_prefixed(f: &mut fmt::Formatter<'_>, key_type: KeyType, bytes: &[u8]) -> fmt::Result {
    write!(f, "{}{}", key_type.prefix(), bs58::encode(bytes).into_string())
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        encode_prefixed(f, KeyType::Ed25519, self.as_bytes())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed(s, KeyType::Ed25519, PUBLIC_KEY_LENGTH, "Public key")?;
        PublicKey::try_from_slice(&bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        encode_prefixed(f, KeyType::Ed25519, self.as_bytes())
    }
}

impl FromStr for Signature {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed(s, KeyType::Ed25519, SIGNATURE_LENGTH, "Signature")?;
        Signature::try_from_slice(&bytes)
    }
}

impl BorshSerialize for PublicKey {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[KeyType::Ed25519.discriminant()])?;
        writer.write_all(self.as_bytes())
    }
}

impl BorshDeserialize for PublicKey {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let tag = u8::deserialize_reader(reader)?;
        if KeyType::from_discriminant(tag).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown key type {tag}"),
            ));
        }
        Ok(PublicKey::from_bytes(<[u8; PUBLIC_KEY_LENGTH]>::deserialize_reader(reader)?))
    }
}

impl BorshSerialize for Signature {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.as_bytes())
    }
}

impl BorshDeserialize for Signature {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        reader.read_exact(&mut bytes)?;
        Ok(Signature::from_bytes(bytes))
    }
}

impl SecretKey {
    /// Canonical text form: `ed25519:` followed by base58 of the 64-byte
    /// expanded key. Not implemented as `Display` so secrets are never
    /// formatted by accident.
    pub fn to_encoded_string(&self) -> String {
        let mut bytes = self.to_keypair_bytes();
        let encoded = format!(
            "{}{}",
            KeyType::Ed25519.prefix(),
            bs58::encode(&bytes).into_string()
        );
        zeroize::Zeroize::zeroize(&mut bytes);
        encoded
    }

    /// Parse the canonical text form.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidEncoding`] for a missing prefix or wrong
    /// width and [`CryptoError::KeyMismatch`] if the embedded public half does
    /// not match the seed.
    pub fn from_encoded_str(s: &str) -> CryptoResult<Self> {
        let mut bytes = decode_prefixed(s, KeyType::Ed25519, KEYPAIR_LENGTH, "Secret key")?;
        let key = SecretKey::from_keypair_bytes(&bytes);
        zeroize::Zeroize::zeroize(&mut bytes);
        key
    }
}

impl FromStr for SecretKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SecretKey::from_encoded_str(s)
    }
}

/// Serde visitor shared by the text-encoded types.
struct EncodedVisitor<T>(std::marker::PhantomData<T>, &'static str);

impl<T> Visitor<'_> for EncodedVisitor<T>
where
    T: FromStr<Err = CryptoError>,
{
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an 'ed25519:'-prefixed base58 {}", self.1)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        v.parse().map_err(E::custom)
    }
}

macro_rules! text_serde {
    ($ty:ty, $what:literal, $encode:expr) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let encode: fn(&$ty) -> String = $encode;
                serializer.serialize_str(&encode(self))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_str(EncodedVisitor::<$ty>(std::marker::PhantomData, $what))
            }
        }
    };
}

text_serde!(PublicKey, "public key", |k| k.to_string());
text_serde!(Signature, "signature", |s| s.to_string());
text_serde!(SecretKey, "secret key", |k| k.to_encoded_string());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_binary_form() {
        let public = SecretKey::from_seed(Some(b"binary")).unwrap().public_key();
        let bytes = borsh::to_vec(&public).unwrap();
        assert_eq!(bytes.len(), 1 + PUBLIC_KEY_LENGTH);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..], public.as_bytes());
        assert_eq!(borsh::from_slice::<PublicKey>(&bytes).unwrap(), public);

        let mut unknown = bytes.clone();
        unknown[0] = 7;
        assert!(borsh::from_slice::<PublicKey>(&unknown).is_err());
        assert!(borsh::from_slice::<PublicKey>(&bytes[..20]).is_err());
    }

    #[test]
    fn test_signature_binary_form_is_raw() {
        let signature = SecretKey::from_seed(Some(b"binary")).unwrap().sign(b"payload");
        let bytes = borsh::to_vec(&signature).unwrap();
        assert_eq!(bytes, signature.as_bytes());
        assert_eq!(borsh::from_slice::<Signature>(&bytes).unwrap(), signature);
    }

    #[test]
    fn test_public_key_text_roundtrip() {
        let public = SecretKey::generate().unwrap().public_key();
        let text = public.to_string();
        assert!(text.starts_with("ed25519:"));
        assert_eq!(text.parse::<PublicKey>().unwrap(), public);
    }

    #[test]
    fn test_zero_public_key_text() {
        // 32 zero bytes encode to 32 '1's in base58
        let zero = PublicKey::from_bytes([0u8; 32]);
        assert_eq!(zero.to_string(), "ed25519:11111111111111111111111111111111");
        assert_eq!(
            "ed25519:11111111111111111111111111111111".parse::<PublicKey>().unwrap(),
            zero
        );
    }

    #[test]
    fn test_signature_text_roundtrip() {
        let secret = SecretKey::generate().unwrap();
        let signature = secret.sign(b"payload");
        assert_eq!(signature.to_string().parse::<Signature>().unwrap(), signature);
    }

    #[test]
    fn test_secret_key_text_roundtrip() {
        let secret = SecretKey::generate().unwrap();
        let text = secret.to_encoded_string();
        let restored: SecretKey = text.parse().unwrap();
        assert_eq!(restored, secret);
        assert_eq!(restored.public_key(), secret.public_key());
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let public = SecretKey::generate().unwrap().public_key();
        let bare = public.to_string().trim_start_matches("ed25519:").to_string();
        assert!(matches!(
            bare.parse::<PublicKey>(),
            Err(CryptoError::InvalidEncoding(_))
        ));
        assert!("secp256k1:abc".parse::<PublicKey>().is_err());
    }

    #[test]
    fn test_wrong_width_rejected() {
        let short = format!("ed25519:{}", bs58::encode([1u8; 31]).into_string());
        assert!(matches!(
            short.parse::<PublicKey>(),
            Err(CryptoError::InvalidEncoding(_))
        ));

        // A public key is not a valid signature
        let public = SecretKey::generate().unwrap().public_key().to_string();
        assert!(public.parse::<Signature>().is_err());

        // A bare 32-byte seed is not the canonical secret key form
        assert!(short.parse::<SecretKey>().is_err());
    }

    #[test]
    fn test_invalid_base58_rejected() {
        // '0' and 'l' are outside the base58 alphabet
        assert!("ed25519:0l0l".parse::<PublicKey>().is_err());
    }

    #[test]
    fn test_serde_as_strings() {
        let secret = SecretKey::from_seed(Some(b"serde")).unwrap();
        let public = secret.public_key();

        let json = serde_json::to_string(&public).unwrap();
        assert_eq!(json, format!("\"{}\"", public));
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), public);

        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(serde_json::from_str::<SecretKey>(&json).unwrap(), secret);

        assert!(serde_json::from_str::<Signature>("\"ed25519:abc\"").is_err());
    }

    #[test]
    fn test_key_type_discriminant() {
        assert_eq!(KeyType::Ed25519.discriminant(), 0);
        assert_eq!(KeyType::from_discriminant(0), Some(KeyType::Ed25519));
        assert_eq!(KeyType::from_discriminant(1), None);
    }
}
