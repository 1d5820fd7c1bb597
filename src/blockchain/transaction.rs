use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::encoding::{self, serialize_finite, EncodingError};

/// Reasons a transaction is refused admission to the pool
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid value: {0}")]
    InvalidValue(f64),

    #[error("Missing public key or signature")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },
}

/// Represents a value transfer between two addresses
///
/// Fields are private so a transaction cannot change after it has been
/// signed or admitted to the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    sender_blockchain_address: String,

    recipient_blockchain_address: String,

    #[serde(serialize_with = "serialize_finite")]
    value: f64,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// # Arguments
    ///
    /// * `sender` - The address of the sender
    /// * `recipient` - The address of the recipient
    /// * `value` - The amount to transfer
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, value: f64) -> Self {
        Transaction {
            sender_blockchain_address: sender.into(),
            recipient_blockchain_address: recipient.into(),
            value,
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender_blockchain_address
    }

    pub fn recipient(&self) -> &str {
        &self.recipient_blockchain_address
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Checks if the transaction was issued by the given mining authority
    pub fn is_reward(&self, mining_sender: &str) -> bool {
        self.sender_blockchain_address == mining_sender
    }

    /// Checks that the value is a finite, strictly positive amount
    ///
    /// Non-finite values have no canonical encoding. Zero and negative values
    /// are refused as hardening: a negative transfer would credit its sender,
    /// and this applies to rewards from the mining sender as well.
    pub fn validate_value(&self) -> Result<(), TransactionError> {
        if !self.value.is_finite() || self.value <= 0.0 {
            return Err(TransactionError::InvalidValue(self.value));
        }
        Ok(())
    }

    /// The bytes a sender signs: the canonical encoding of the transaction
    ///
    /// Block hashing uses the same encoding, so a signature covers exactly
    /// what ends up in the chain.
    pub fn signing_message(&self) -> Result<Vec<u8>, EncodingError> {
        encoding::canonical_bytes(self)
    }

    /// Calculates the hash of the transaction
    pub fn hash(&self) -> Result<String, EncodingError> {
        encoding::hash(self)
    }
}
