//! Token balances and gas amounts.
//!
//! Balances are denominated in yoctoNEAR (10^-24 NEAR) and fit in 128 bits.
//! Gas is a 64-bit counter. Both reject out-of-range values instead of
//! truncating.

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ValidationError, ValidationResult};

/// Number of yoctoNEAR in one NEAR.
pub const YOCTO_PER_NEAR: u128 = 1_000_000_000_000_000_000_000_000;

/// Gas units in one teragas.
pub const GAS_PER_TERA: u64 = 1_000_000_000_000;

/// An amount of NEAR in yoctoNEAR.
///
/// Serialized to JSON as a decimal string, since 128-bit integers do not
/// survive a round trip through most JSON number implementations.
///
/// The binary form is the raw little-endian `u128`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize,
    BorshDeserialize,
)]
pub struct Balance(u128);

impl Balance {
    /// Zero balance.
    pub const ZERO: Balance = Balance(0);

    /// Wrap a raw yoctoNEAR amount.
    pub const fn from_yocto_near(yocto: u128) -> Self {
        Self(yocto)
    }

    /// Convert whole NEAR to yoctoNEAR.
    ///
    /// # Errors
    /// Returns an error if the result does not fit in 128 bits.
    pub fn from_near(near: u128) -> ValidationResult<Self> {
        near.checked_mul(YOCTO_PER_NEAR)
            .map(Self)
            .ok_or_else(|| ValidationError::OutOfRange(format!("{near} NEAR")))
    }

    /// Convert milliNEAR to yoctoNEAR.
    pub fn from_milli_near(milli: u128) -> ValidationResult<Self> {
        milli
            .checked_mul(YOCTO_PER_NEAR / 1_000)
            .map(Self)
            .ok_or_else(|| ValidationError::OutOfRange(format!("{milli} mNEAR")))
    }

    /// Raw amount in yoctoNEAR.
    pub const fn as_yocto_near(&self) -> u128 {
        self.0
    }

    /// Whether the balance is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Balance) -> Option<Balance> {
        self.0.checked_add(other.0).map(Balance)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Balance) -> Option<Balance> {
        self.0.checked_sub(other.0).map(Balance)
    }

    /// Saturating subtraction.
    pub fn saturating_sub(self, other: Balance) -> Balance {
        Balance(self.0.saturating_sub(other.0))
    }
}

impl From<u128> for Balance {
    fn from(yocto: u128) -> Self {
        Self(yocto)
    }
}

impl FromStr for Balance {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // u128::from_str accepts a leading '+', which is not canonical.
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidBalance(s.to_string()));
        }
        s.parse::<u128>()
            .map(Self)
            .map_err(|e| ValidationError::InvalidBalance(format!("{s}: {e}")))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BalanceVisitor;

        impl Visitor<'_> for BalanceVisitor {
            type Value = Balance;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string holding an unsigned 128-bit yoctoNEAR amount")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Balance, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(BalanceVisitor)
    }
}

/// An amount of gas attached to a function call.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
#[serde(transparent)]
pub struct Gas(u64);

impl Gas {
    /// Wrap a raw gas amount.
    pub const fn from_gas(gas: u64) -> Self {
        Self(gas)
    }

    /// Convert teragas to gas.
    ///
    /// # Errors
    /// Returns an error if the result does not fit in 64 bits.
    pub fn from_tera_gas(tera: u64) -> ValidationResult<Self> {
        tera.checked_mul(GAS_PER_TERA)
            .map(Self)
            .ok_or_else(|| ValidationError::OutOfRange(format!("{tera} TGas")))
    }

    /// Raw gas amount.
    pub const fn as_gas(&self) -> u64 {
        self.0
    }
}

impl FromStr for Gas {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidGas(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| ValidationError::InvalidGas(format!("{s}: {e}")))
    }
}

impl fmt::Display for Gas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_near() {
        assert_eq!(Balance::from_near(1).unwrap().as_yocto_near(), YOCTO_PER_NEAR);
        assert_eq!(
            Balance::from_milli_near(314).unwrap().as_yocto_near(),
            314 * 10u128.pow(21)
        );
        assert!(Balance::from_near(u128::MAX).is_err());
    }

    #[test]
    fn test_balance_parse_rejects_out_of_range() {
        let max = u128::MAX.to_string();
        assert_eq!(max.parse::<Balance>().unwrap().as_yocto_near(), u128::MAX);

        // 2^128 does not fit
        let too_big = "340282366920938463463374607431768211456";
        assert!(too_big.parse::<Balance>().is_err());

        assert!("-1".parse::<Balance>().is_err());
        assert!("+1".parse::<Balance>().is_err());
        assert!("".parse::<Balance>().is_err());
        assert!("1.5".parse::<Balance>().is_err());
    }

    #[test]
    fn test_balance_json_is_string() {
        let b = Balance::from_yocto_near(10);
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"10\"");
        let parsed: Balance = serde_json::from_str("\"10\"").unwrap();
        assert_eq!(parsed, b);

        assert!(serde_json::from_str::<Balance>("10").is_err());
    }

    #[test]
    fn test_balance_binary_is_le_u128() {
        let bytes = borsh::to_vec(&Balance::from_yocto_near(258)).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..3], &[2, 1, 0]);
        assert_eq!(borsh::to_vec(&Gas::from_gas(1)).unwrap(), 1u64.to_le_bytes());
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Balance::from_yocto_near(u128::MAX);
        assert!(a.checked_add(Balance::from_yocto_near(1)).is_none());
        assert!(Balance::ZERO.checked_sub(Balance::from_yocto_near(1)).is_none());
        assert_eq!(
            Balance::ZERO.saturating_sub(Balance::from_yocto_near(1)),
            Balance::ZERO
        );
    }

    #[test]
    fn test_gas() {
        assert_eq!(Gas::from_tera_gas(40).unwrap().as_gas(), 40_000_000_000_000);
        assert!(Gas::from_tera_gas(u64::MAX).is_err());
        assert!("18446744073709551616".parse::<Gas>().is_err());
        assert_eq!(serde_json::to_string(&Gas::from_gas(5)).unwrap(), "5");
    }
}
