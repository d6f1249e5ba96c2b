//! NEAR transactions carrying contract calls.
//!
//! A transaction is hashed over its borsh encoding and the signer signs that
//! hash.

use std::io;

use borsh::{BorshDeserialize, BorshSerialize};
use paychan_channel::{FunctionCall, codec};
use paychan_crypto::{CryptoHash, KeyType, PublicKey, Signature};
use paychan_types::AccountId;

use crate::error::ClientResult;
use crate::signer::InMemorySigner;

/// Binary tag of the `FunctionCall` action.
const ACTION_FUNCTION_CALL: u8 = 2;

/// A transaction action. Only contract calls are needed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FunctionCall(FunctionCall),
}

impl Action {
    pub fn method_name(&self) -> &str {
        match self {
            Action::FunctionCall(call) => &call.method_name,
        }
    }
}

impl BorshSerialize for Action {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Action::FunctionCall(call) => {
                BorshSerialize::serialize(&ACTION_FUNCTION_CALL, writer)?;
                BorshSerialize::serialize(call, writer)
            }
        }
    }
}

impl BorshDeserialize for Action {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        match u8::deserialize_reader(reader)? {
            ACTION_FUNCTION_CALL => {
                let call = FunctionCall::deserialize_reader(reader)?;
                Ok(Action::FunctionCall(call))
            }
            tag => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported action {tag}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub signer_id: AccountId,
    pub public_key: PublicKey,
    pub nonce: u64,
    pub receiver_id: AccountId,
    pub block_hash: CryptoHash,
    pub actions: Vec<Action>,
}

impl Transaction {
    /// Hash of the canonical encoding; this is what gets signed.
    pub fn hash(&self) -> ClientResult<CryptoHash> {
        Ok(CryptoHash::hash_bytes(&codec::to_binary_form(self)?))
    }

    pub fn sign(self, signer: &InMemorySigner) -> ClientResult<SignedTransaction> {
        let bytes = codec::to_binary_form(&self)?;
        let hash = CryptoHash::hash_bytes(&bytes);
        let signature = signer.sign(hash.as_bytes());
        Ok(SignedTransaction {
            transaction: self,
            signature,
            hash,
            size: bytes.len() as u64,
        })
    }

    /// Method name of the first call, for logs and errors.
    pub fn method_name(&self) -> &str {
        self.actions.first().map(Action::method_name).unwrap_or("")
    }
}

/// A signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
    pub hash: CryptoHash,
    /// Length of the encoded transaction in bytes.
    pub size: u64,
}

impl SignedTransaction {
    /// Whether the signature matches the transaction's own public key and
    /// the hash matches its contents.
    pub fn verify(&self) -> bool {
        self.transaction.hash().is_ok_and(|hash| hash == self.hash)
            && self
                .transaction
                .public_key
                .verify(&self.signature, self.hash.as_bytes())
    }
}

/// Submission form: the transaction followed by the key-type tagged
/// signature.
impl BorshSerialize for SignedTransaction {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.transaction, writer)?;
        BorshSerialize::serialize(&KeyType::Ed25519.discriminant(), writer)?;
        BorshSerialize::serialize(&self.signature, writer)
    }
}
