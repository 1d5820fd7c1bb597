use log::{error, info, warn};

use super::block::Block;
use super::pow::PowError;
use super::transaction::{Transaction, TransactionError};

/// Receives notable ledger events
///
/// Passed into the ledger at construction instead of relying on a global
/// logger. Every method has an empty default body.
pub trait ChainObserver: Send + Sync {
    fn transaction_accepted(&self, _transaction: &Transaction) {}

    fn transaction_rejected(&self, _transaction: &Transaction, _reason: &TransactionError) {}

    fn block_mined(&self, _index: usize, _block: &Block) {}

    fn mining_failed(&self, _error: &PowError) {}
}

/// Observer that reports events through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ChainObserver for LogObserver {
    fn transaction_accepted(&self, transaction: &Transaction) {
        info!(
            "action=add_transaction status=success sender={} recipient={} value={}",
            transaction.sender(),
            transaction.recipient(),
            transaction.value()
        );
    }

    fn transaction_rejected(&self, transaction: &Transaction, reason: &TransactionError) {
        error!(
            "action=add_transaction status=rejected sender={} error={}",
            transaction.sender(),
            reason
        );
    }

    fn block_mined(&self, index: usize, block: &Block) {
        info!(
            "action=mining status=success index={} nonce={} transactions={}",
            index,
            block.nonce(),
            block.transactions().len()
        );
    }

    fn mining_failed(&self, error: &PowError) {
        warn!("action=mining status=failed error={}", error);
    }
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChainObserver for NoopObserver {}
