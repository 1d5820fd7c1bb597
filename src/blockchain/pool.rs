use super::transaction::Transaction;

/// Ordered pool of transactions accepted but not yet sealed into a block
///
/// Admission rules live in the blockchain, which is the pool's only owner;
/// the pool itself just keeps insertion order.
#[derive(Debug, Default)]
pub(crate) struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    /// Copy of the pending transactions, in insertion order
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Moves every pending transaction out, leaving the pool empty
    pub fn take_all(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    /// Drops transactions added after the pool had `len` entries
    pub fn truncate(&mut self, len: usize) {
        self.transactions.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }
}
