// Blockchain module
//
// This module contains the ledger core:
// - Canonical encoding and hashing
// - Transaction and block structures
// - ECDSA P-256 signature verification
// - Transaction pool
// - Proof of work search
// - The blockchain (chain + pool owner)

pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod observer;
mod pool;
pub mod pow;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use config::{ChainConfig, ConfigError};
pub use crypto::{verify_transaction_signature, CryptoError, DigitalSignature, Wallet};
pub use observer::{ChainObserver, LogObserver, NoopObserver};
pub use pow::{CancellationToken, PowError, ProofOfWork};
pub use transaction::{Transaction, TransactionError};
