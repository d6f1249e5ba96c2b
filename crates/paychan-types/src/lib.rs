//! Primitive types for NEAR payment channels.
//!
//! - [`AccountId`]: validated chain address
//! - [`Balance`]: 128-bit yoctoNEAR amount
//! - [`Gas`]: 64-bit gas amount
//!
//! Every type validates on construction, so a value that exists is valid.

pub mod account_id;
pub mod balance;
pub mod error;

pub use account_id::{AccountId, MAX_ACCOUNT_ID_LEN, MIN_ACCOUNT_ID_LEN, validate_account_id};
pub use balance::{Balance, GAS_PER_TERA, Gas, YOCTO_PER_NEAR};
pub use error::{ValidationError, ValidationResult};
