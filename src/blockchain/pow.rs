use serde::Serialize;
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::encoding::{self, EncodingError};
use super::transaction::Transaction;

/// Default number of leading hex zeros a block hash must carry
pub const DEFAULT_DIFFICULTY: usize = 3;

/// Length of a SHA-256 digest in hex, the highest meaningful difficulty
pub const MAX_DIFFICULTY: usize = 64;

/// Errors that can end a proof of work search
#[derive(Debug, Error)]
pub enum PowError {
    #[error("Proof of work cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("No valid nonce found within {attempts} attempts")]
    Exhausted { attempts: u64 },

    #[error("Encoding error: {0}")]
    EncodingError(#[from] EncodingError),
}

/// Shared flag a caller sets to stop a running search
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// The record a proof is computed over; the timestamp is only assigned when
/// the block is sealed, so it is not part of the work target.
#[derive(Serialize)]
struct Candidate<'a> {
    transactions: &'a [Transaction],
    previous_hash: &'a str,
    nonce: u64,
}

/// Brute-force nonce search against a leading-zeros target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
    max_attempts: Option<u64>,
}

impl ProofOfWork {
    /// Creates an unbounded search for the given difficulty
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork {
            difficulty,
            max_attempts: None,
        }
    }

    /// Caps the number of nonces tried before giving up
    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Checks whether `nonce` solves the puzzle for this transaction set
    pub fn valid_proof(
        &self,
        transactions: &[Transaction],
        previous_hash: &str,
        nonce: u64,
    ) -> Result<bool, PowError> {
        let candidate = Candidate {
            transactions,
            previous_hash,
            nonce,
        };
        let guess_hash = encoding::hash(&candidate)?;

        Ok(meets_difficulty(&guess_hash, self.difficulty))
    }

    /// Searches nonces from 0 upwards and returns the first valid one
    ///
    /// # Arguments
    ///
    /// * `transactions` - The transactions the block will seal
    /// * `previous_hash` - The hash of the chain's tail block
    /// * `cancel` - Checked before every attempt
    ///
    /// # Returns
    ///
    /// The smallest nonce whose candidate hash meets the difficulty
    pub fn solve(
        &self,
        transactions: &[Transaction],
        previous_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, PowError> {
        let mut nonce: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PowError::Cancelled { attempts: nonce });
            }
            if let Some(max_attempts) = self.max_attempts {
                if nonce >= max_attempts {
                    return Err(PowError::Exhausted { attempts: nonce });
                }
            }

            if self.valid_proof(transactions, previous_hash, nonce)? {
                return Ok(nonce);
            }

            nonce = nonce
                .checked_add(1)
                .ok_or(PowError::Exhausted { attempts: u64::MAX })?;
        }
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }
}

/// Checks that a hex digest starts with `difficulty` zero characters
pub fn meets_difficulty(hash_hex: &str, difficulty: usize) -> bool {
    hash_hex.len() >= difficulty && hash_hex.bytes().take(difficulty).all(|b| b == b'0')
}
