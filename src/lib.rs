//! A minimal append-only proof-of-work ledger.
//!
//! Transactions are validated (ECDSA P-256 signature and sender balance) into
//! a pool, mined into blocks with a leading-zeros proof of work, and chained
//! by the SHA-256 hash of each block's canonical encoding.

pub mod blockchain;

pub use blockchain::{
    Block, Blockchain, BlockchainError, CancellationToken, ChainConfig, ChainObserver,
    DigitalSignature, LogObserver, NoopObserver, PowError, ProofOfWork, Transaction,
    TransactionError, Wallet,
};
