use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pow::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};

/// Reserved sender of mining rewards
pub const MINING_SENDER: &str = "THE BLOCKCHAIN";

/// Amount credited to the ledger owner for every mined block
pub const MINING_REWARD: f64 = 1.0;

/// Errors raised for an unusable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid difficulty: {0} (expected 1..={max})", max = MAX_DIFFICULTY)]
    InvalidDifficulty(usize),

    #[error("Invalid mining reward: {0}")]
    InvalidReward(f64),

    #[error("Mining sender must not be empty")]
    EmptyMiningSender,
}

/// Settings of a ledger
///
/// Deserializes with defaults for every missing field, so an embedding
/// application can load a partial JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Address credited with the mining reward
    pub owner_address: Option<String>,

    /// Mining difficulty (number of leading zeros required in hash)
    pub difficulty: usize,

    /// Mining reward
    pub mining_reward: f64,

    /// Reserved sender identifier for rewards
    pub mining_sender: String,

    /// Whether non-reward transactions need a valid signature and balance
    pub verify_transactions: bool,

    /// Ceiling on nonces tried per block, unbounded when `None`
    pub max_mining_attempts: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            owner_address: None,
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: MINING_REWARD,
            mining_sender: MINING_SENDER.to_string(),
            verify_transactions: true,
            max_mining_attempts: None,
        }
    }
}

impl ChainConfig {
    pub fn with_owner(mut self, owner_address: impl Into<String>) -> Self {
        self.owner_address = Some(owner_address.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_mining_reward(mut self, mining_reward: f64) -> Self {
        self.mining_reward = mining_reward;
        self
    }

    pub fn with_verification(mut self, verify_transactions: bool) -> Self {
        self.verify_transactions = verify_transactions;
        self
    }

    pub fn with_max_mining_attempts(mut self, max_mining_attempts: u64) -> Self {
        self.max_mining_attempts = Some(max_mining_attempts);
        self
    }

    /// Checks the settings a ledger cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty == 0 || self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::InvalidDifficulty(self.difficulty));
        }
        if !self.mining_reward.is_finite() || self.mining_reward <= 0.0 {
            return Err(ConfigError::InvalidReward(self.mining_reward));
        }
        if self.mining_sender.is_empty() {
            return Err(ConfigError::EmptyMiningSender);
        }
        Ok(())
    }
}
