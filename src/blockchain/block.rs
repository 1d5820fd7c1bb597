use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::encoding::{self, serialize_finite, EncodingError};
use super::transaction::Transaction;

/// Represents a block in the blockchain
///
/// Blocks are sealed when created and never modified afterwards; the hash of a
/// block is always computed from its canonical encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Seconds since the Unix epoch at sealing time
    #[serde(serialize_with = "serialize_finite")]
    timestamp: f64,

    /// Transactions in pool insertion order
    transactions: Vec<Transaction>,

    /// Proof of work (nonce)
    nonce: u64,

    /// Hash of the previous block
    previous_hash: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `transactions` - The transactions to include in the block
    /// * `nonce` - The proof of work (nonce)
    /// * `previous_hash` - The hash of the previous block
    pub fn new(transactions: Vec<Transaction>, nonce: u64, previous_hash: String) -> Self {
        Block {
            timestamp: unix_timestamp(),
            transactions,
            nonce,
            previous_hash,
        }
    }

    /// Creates the genesis block: no transactions, nonce 0, and the hash of
    /// the empty record as previous hash
    pub fn genesis() -> Self {
        Self::new(Vec::new(), 0, encoding::empty_record_hash())
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block's canonical encoding as a hexadecimal string
    pub fn hash(&self) -> Result<String, EncodingError> {
        encoding::hash(self)
    }

    /// Canonical bytes of the block, the format a collaborator persists
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        encoding::canonical_bytes(self)
    }
}

/// Current time as fractional seconds since the Unix epoch
fn unix_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
