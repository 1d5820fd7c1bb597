use parking_lot::Mutex;
use thiserror::Error;

use std::fmt;
use std::sync::Arc;

use super::block::Block;
use super::config::{ChainConfig, ConfigError};
use super::crypto::verify_transaction_signature;
use super::encoding::EncodingError;
use super::observer::{ChainObserver, LogObserver};
use super::pool::TransactionPool;
use super::pow::{CancellationToken, PowError, ProofOfWork};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Proof of work error: {0}")]
    PowError(#[from] PowError),

    #[error("Encoding error: {0}")]
    EncodingError(#[from] EncodingError),
}

/// Chain and pool, guarded together so that admission and sealing never
/// interleave
struct LedgerState {
    chain: Vec<Block>,
    pool: TransactionPool,
}

/// Represents the blockchain
///
/// The ledger exclusively owns its chain and its pool of pending
/// transactions. All operations take `&self`; share the ledger between
/// threads with an `Arc`.
pub struct Blockchain {
    state: Mutex<LedgerState>,

    config: ChainConfig,

    pow: ProofOfWork,

    observer: Arc<dyn ChainObserver>,
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blockchain")
            .field("config", &self.config)
            .field("chain_length", &self.chain_length())
            .finish()
    }
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block and default settings
    ///
    /// # Arguments
    ///
    /// * `owner_address` - The address credited with mining rewards
    pub fn new(owner_address: Option<String>) -> Self {
        let config = ChainConfig {
            owner_address,
            ..ChainConfig::default()
        };

        Self::build(config, Arc::new(LogObserver))
    }

    /// Creates a new blockchain from a configuration, logging through `log`
    pub fn with_config(config: ChainConfig) -> Result<Self, BlockchainError> {
        Self::with_observer(config, Arc::new(LogObserver))
    }

    /// Creates a new blockchain reporting its events to `observer`
    pub fn with_observer(
        config: ChainConfig,
        observer: Arc<dyn ChainObserver>,
    ) -> Result<Self, BlockchainError> {
        config.validate()?;
        Ok(Self::build(config, observer))
    }

    fn build(config: ChainConfig, observer: Arc<dyn ChainObserver>) -> Self {
        let pow = ProofOfWork::new(config.difficulty).with_max_attempts(config.max_mining_attempts);

        Blockchain {
            state: Mutex::new(LedgerState {
                chain: vec![Block::genesis()],
                pool: TransactionPool::new(),
            }),
            config,
            pow,
            observer,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn owner(&self) -> Option<&str> {
        self.config.owner_address.as_deref()
    }

    /// Adds a transaction to the pool if it passes validation
    ///
    /// # Returns
    ///
    /// `true` if the transaction was accepted, `false` if it was rejected
    pub fn submit(
        &self,
        sender: &str,
        recipient: &str,
        value: f64,
        public_key: Option<&str>,
        signature: Option<&str>,
    ) -> bool {
        self.try_submit(sender, recipient, value, public_key, signature)
            .is_ok()
    }

    /// Adds a transaction to the pool, reporting why it was rejected
    ///
    /// Rewards issued by the mining sender skip the signature and balance
    /// checks. Other transactions must carry a valid signature over their
    /// canonical encoding, and the sender's confirmed balance minus what they
    /// already have pending must cover the value.
    pub fn try_submit(
        &self,
        sender: &str,
        recipient: &str,
        value: f64,
        public_key: Option<&str>,
        signature: Option<&str>,
    ) -> Result<(), TransactionError> {
        let transaction = Transaction::new(sender, recipient, value);
        let mut state = self.state.lock();

        match self.check_admission(&state, &transaction, public_key, signature) {
            Ok(()) => {
                self.observer.transaction_accepted(&transaction);
                state.pool.push(transaction);
                Ok(())
            }
            Err(err) => {
                self.observer.transaction_rejected(&transaction, &err);
                Err(err)
            }
        }
    }

    fn check_admission(
        &self,
        state: &LedgerState,
        transaction: &Transaction,
        public_key: Option<&str>,
        signature: Option<&str>,
    ) -> Result<(), TransactionError> {
        transaction.validate_value()?;

        if transaction.is_reward(&self.config.mining_sender) || !self.config.verify_transactions {
            return Ok(());
        }

        let (public_key, signature) = match (public_key, signature) {
            (Some(public_key), Some(signature)) => (public_key, signature),
            _ => return Err(TransactionError::MissingSignature),
        };

        if !verify_transaction_signature(public_key, signature, transaction) {
            return Err(TransactionError::InvalidSignature);
        }

        let pending_outgoing: f64 = state
            .pool
            .iter()
            .filter(|pending| pending.sender() == transaction.sender())
            .map(Transaction::value)
            .sum();
        let available = balance_in(&state.chain, transaction.sender()) - pending_outgoing;

        if available < transaction.value() {
            return Err(TransactionError::InsufficientFunds {
                required: transaction.value(),
                available,
            });
        }

        Ok(())
    }

    /// Seals the current pool into a new block and appends it to the chain
    ///
    /// No proof of work is checked here; `mine` is the path that searches for
    /// a valid nonce first.
    ///
    /// # Returns
    ///
    /// The sealed block
    pub fn create_block(&self, nonce: u64, previous_hash: String) -> Block {
        let mut state = self.state.lock();
        seal(&mut state, nonce, previous_hash)
    }

    /// Mines a block, returning whether one was appended
    pub fn mine(&self) -> bool {
        self.mine_with(&CancellationToken::new()).is_ok()
    }

    /// Mines a new block with the pending transactions
    ///
    /// The reward transaction is queued, the pool and tail hash are captured,
    /// a nonce is searched for and the block is sealed, all while holding the
    /// ledger lock. If the search is cancelled or exhausted the reward is
    /// withdrawn and the chain is left untouched.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Token a caller can set to abort the proof of work search
    ///
    /// # Returns
    ///
    /// Result with the newly mined block
    pub fn mine_with(&self, cancel: &CancellationToken) -> Result<Block, BlockchainError> {
        let mut state = self.state.lock();
        let mark = state.pool.len();

        if let Some(owner) = &self.config.owner_address {
            let reward = Transaction::new(
                self.config.mining_sender.as_str(),
                owner.as_str(),
                self.config.mining_reward,
            );
            self.observer.transaction_accepted(&reward);
            state.pool.push(reward);
        }

        let proof = tail_hash(&state).map_err(BlockchainError::from).and_then(|previous_hash| {
            let transactions = state.pool.snapshot();
            let nonce = self.pow.solve(&transactions, &previous_hash, cancel)?;
            Ok((nonce, previous_hash))
        });

        match proof {
            Ok((nonce, previous_hash)) => {
                let block = seal(&mut state, nonce, previous_hash);
                self.observer.block_mined(state.chain.len() - 1, &block);
                Ok(block)
            }
            Err(err) => {
                state.pool.truncate(mark);
                if let BlockchainError::PowError(pow_error) = &err {
                    self.observer.mining_failed(pow_error);
                }
                Err(err)
            }
        }
    }

    /// Computes the balance of an address by replaying every transaction in
    /// the chain
    pub fn balance_of(&self, address: &str) -> f64 {
        let state = self.state.lock();
        balance_in(&state.chain, address)
    }

    /// Gets the entire blockchain
    pub fn chain(&self) -> Vec<Block> {
        self.state.lock().chain.clone()
    }

    pub fn chain_length(&self) -> usize {
        self.state.lock().chain.len()
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Block {
        let state = self.state.lock();
        // The genesis block is created with the ledger, so the chain is never empty.
        state.chain[state.chain.len() - 1].clone()
    }

    /// Gets all pending transactions
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().pool.snapshot()
    }

    /// Validates the blockchain
    ///
    /// Every block after genesis must reference the hash of its predecessor
    /// and carry a nonce that meets the configured difficulty.
    pub fn is_valid(&self) -> bool {
        let state = self.state.lock();
        let chain = &state.chain;

        let genesis_ok = chain
            .first()
            .map(|genesis| {
                genesis.nonce() == 0
                    && genesis.transactions().is_empty()
                    && genesis.previous_hash() == super::encoding::empty_record_hash()
            })
            .unwrap_or(false);
        if !genesis_ok {
            return false;
        }

        chain.windows(2).all(|pair| {
            let (previous_block, current_block) = (&pair[0], &pair[1]);

            let linked = match previous_block.hash() {
                Ok(hash) => hash == current_block.previous_hash(),
                Err(_) => false,
            };

            linked
                && self
                    .pow
                    .valid_proof(
                        current_block.transactions(),
                        current_block.previous_hash(),
                        current_block.nonce(),
                    )
                    .unwrap_or(false)
        })
    }
}

fn seal(state: &mut LedgerState, nonce: u64, previous_hash: String) -> Block {
    let transactions = state.pool.take_all();
    let block = Block::new(transactions, nonce, previous_hash);
    state.chain.push(block.clone());
    block
}

fn tail_hash(state: &LedgerState) -> Result<String, EncodingError> {
    match state.chain.last() {
        Some(block) => block.hash(),
        None => Ok(super::encoding::empty_record_hash()),
    }
}

fn balance_in(chain: &[Block], address: &str) -> f64 {
    let mut total_amount = 0.0;

    for transaction in chain.iter().flat_map(|block| block.transactions()) {
        if transaction.recipient() == address {
            total_amount += transaction.value();
        }
        if transaction.sender() == address {
            total_amount -= transaction.value();
        }
    }

    total_amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;
    use crate::blockchain::encoding::empty_record_hash;
    use crate::blockchain::observer::NoopObserver;

    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn test_chain(owner: &str) -> Blockchain {
        init_logger();
        Blockchain::with_config(ChainConfig::default().with_owner(owner).with_difficulty(1)).unwrap()
    }

    fn signed_submit(
        blockchain: &Blockchain,
        wallet: &Wallet,
        sender: &str,
        recipient: &str,
        value: f64,
    ) -> Result<(), TransactionError> {
        let transaction = Transaction::new(sender, recipient, value);
        let signature = wallet.sign_transaction(&transaction).unwrap();

        blockchain.try_submit(
            sender,
            recipient,
            value,
            Some(&wallet.public_key_hex()),
            Some(&signature.0),
        )
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: parking_lot::Mutex<Vec<String>>,
    }

    impl ChainObserver for RecordingObserver {
        fn transaction_accepted(&self, transaction: &Transaction) {
            self.events.lock().push(format!("accepted:{}", transaction.sender()));
        }

        fn transaction_rejected(&self, transaction: &Transaction, _reason: &TransactionError) {
            self.events.lock().push(format!("rejected:{}", transaction.sender()));
        }

        fn block_mined(&self, index: usize, _block: &Block) {
            self.events.lock().push(format!("mined:{}", index));
        }

        fn mining_failed(&self, _error: &PowError) {
            self.events.lock().push("mining_failed".to_string());
        }
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = Blockchain::new(Some("my_address".to_string()));
        let chain = blockchain.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].nonce(), 0);
        assert!(chain[0].transactions().is_empty());
        assert_eq!(chain[0].previous_hash(), empty_record_hash());
        assert_eq!(blockchain.owner(), Some("my_address"));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_with_config_rejects_invalid_settings() {
        let result = Blockchain::with_config(ChainConfig::default().with_difficulty(0));

        assert!(matches!(
            result,
            Err(BlockchainError::ConfigError(ConfigError::InvalidDifficulty(0)))
        ));
    }

    #[test]
    fn test_reward_sender_bypasses_checks() {
        let blockchain = test_chain("miner");

        assert!(blockchain.submit("THE BLOCKCHAIN", "anyone", 5.0, None, None));
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_unsigned_transaction_rejected() {
        let blockchain = test_chain("miner");

        let result = blockchain.try_submit("A", "B", 1.0, None, None);

        assert!(matches!(result, Err(TransactionError::MissingSignature)));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let blockchain = test_chain("miner");
        let wallet = Wallet::new();
        let signature = wallet.sign_transaction(&Transaction::new("A", "B", 1.0)).unwrap();

        // Signed for 1.0, submitted for 2.0.
        let result = blockchain.try_submit(
            "A",
            "B",
            2.0,
            Some(&wallet.public_key_hex()),
            Some(&signature.0),
        );

        assert!(matches!(result, Err(TransactionError::InvalidSignature)));
        assert!(!blockchain.submit("A", "B", 1.0, Some("zz"), Some(&signature.0)));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_invalid_value_rejected_for_every_sender() {
        let blockchain = test_chain("miner");

        assert!(!blockchain.submit("THE BLOCKCHAIN", "anyone", f64::NAN, None, None));
        assert!(!blockchain.submit("THE BLOCKCHAIN", "anyone", -1.0, None, None));
        assert!(!blockchain.submit("THE BLOCKCHAIN", "anyone", 0.0, None, None));
        assert!(matches!(
            blockchain.try_submit("THE BLOCKCHAIN", "anyone", 0.0, None, None),
            Err(TransactionError::InvalidValue(_))
        ));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_insufficient_funds() {
        let blockchain = test_chain("miner");
        let wallet = Wallet::new();

        let result = signed_submit(&blockchain, &wallet, "C", "D", 2.0);

        match result {
            Err(TransactionError::InsufficientFunds { required, available }) => {
                assert_eq!(required, 2.0);
                assert_eq!(available, 0.0);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_any_valid_key_can_spend_from_funded_address() {
        let blockchain = test_chain("alice");
        // Addresses are not bound to keys: a fresh wallet's signature is
        // enough to spend what "alice" holds.
        let wallet = Wallet::new();

        assert!(blockchain.mine());
        assert!(blockchain.mine());
        assert_eq!(blockchain.balance_of("alice"), 2.0);

        signed_submit(&blockchain, &wallet, "alice", "bob", 1.5).unwrap();
        assert_eq!(blockchain.pending_transactions().len(), 1);

        assert!(blockchain.mine());
        assert_eq!(blockchain.balance_of("alice"), 1.5);
        assert_eq!(blockchain.balance_of("bob"), 1.5);
    }

    #[test]
    fn test_pending_spends_count_against_balance() {
        let blockchain = test_chain("alice");
        let wallet = Wallet::new();
        assert!(blockchain.mine());

        signed_submit(&blockchain, &wallet, "alice", "bob", 1.0).unwrap();
        let second = signed_submit(&blockchain, &wallet, "alice", "carol", 1.0);

        assert!(matches!(second, Err(TransactionError::InsufficientFunds { .. })));
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_mine_block() {
        let blockchain = test_chain("my_address");
        assert!(blockchain.submit("THE BLOCKCHAIN", "A", 3.0, None, None));

        let block = blockchain.mine_with(&CancellationToken::new()).unwrap();

        assert_eq!(blockchain.chain_length(), 2);
        assert_eq!(block.transactions().len(), 2); // Original transaction + mining reward
        assert_eq!(block.transactions()[1].recipient(), "my_address");
        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.last_block(), block);
    }

    #[test]
    fn test_mine_without_owner_issues_no_reward() {
        init_logger();
        let blockchain = Blockchain::with_config(ChainConfig::default().with_difficulty(1)).unwrap();

        let block = blockchain.mine_with(&CancellationToken::new()).unwrap();

        assert!(block.transactions().is_empty());
        assert_eq!(blockchain.chain_length(), 2);
    }

    #[test]
    fn test_previous_hash_links() {
        let blockchain = test_chain("my_address");
        for _ in 0..4 {
            assert!(blockchain.mine());
        }

        let chain = blockchain.chain();
        for i in 1..chain.len() {
            assert_eq!(chain[i].previous_hash(), chain[i - 1].hash().unwrap());
        }
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_mined_nonce_meets_difficulty() {
        let blockchain = test_chain("my_address");
        let block = blockchain.mine_with(&CancellationToken::new()).unwrap();

        let pow = ProofOfWork::new(1);
        assert!(pow
            .valid_proof(block.transactions(), block.previous_hash(), block.nonce())
            .unwrap());
    }

    #[test]
    fn test_create_block_drains_pool() {
        let blockchain = test_chain("my_address");
        assert!(blockchain.submit("THE BLOCKCHAIN", "A", 1.0, None, None));
        let previous_hash = blockchain.last_block().hash().unwrap();

        let block = blockchain.create_block(42, previous_hash.clone());

        assert_eq!(block.nonce(), 42);
        assert_eq!(block.previous_hash(), previous_hash);
        assert_eq!(block.transactions().len(), 1);
        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.chain_length(), 2);
    }

    #[test]
    fn test_exhausted_search_leaves_ledger_untouched() {
        init_logger();
        let config = ChainConfig::default()
            .with_owner("my_address")
            .with_difficulty(64)
            .with_max_mining_attempts(20);
        let blockchain = Blockchain::with_observer(config, Arc::new(NoopObserver)).unwrap();
        assert!(blockchain.submit("THE BLOCKCHAIN", "A", 1.0, None, None));

        let result = blockchain.mine_with(&CancellationToken::new());

        assert!(matches!(
            result,
            Err(BlockchainError::PowError(PowError::Exhausted { attempts: 20 }))
        ));
        assert!(!blockchain.mine());
        assert_eq!(blockchain.chain_length(), 1);
        // The reward was withdrawn, the submitted transaction stays pending.
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_cancel_mining_from_another_thread() {
        init_logger();
        let config = ChainConfig::default().with_owner("my_address").with_difficulty(64);
        let blockchain = Arc::new(Blockchain::with_config(config).unwrap());
        let token = CancellationToken::new();

        let worker = {
            let blockchain = Arc::clone(&blockchain);
            let token = token.clone();
            thread::spawn(move || blockchain.mine_with(&token))
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let result = worker.join().unwrap();
        assert!(matches!(
            result,
            Err(BlockchainError::PowError(PowError::Cancelled { .. }))
        ));
        assert_eq!(blockchain.chain_length(), 1);
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_observer_receives_events() {
        let observer = Arc::new(RecordingObserver::default());
        let config = ChainConfig::default().with_owner("my_address").with_difficulty(1);
        let blockchain = Blockchain::with_observer(config, observer.clone()).unwrap();

        assert!(!blockchain.submit("A", "B", 1.0, None, None));
        assert!(blockchain.mine());

        let events = observer.events.lock().clone();
        assert_eq!(
            events,
            vec![
                "rejected:A".to_string(),
                "accepted:THE BLOCKCHAIN".to_string(),
                "mined:1".to_string(),
            ]
        );
    }

    #[test]
    fn test_block_without_work_is_invalid() {
        let blockchain = test_chain("my_address");
        assert!(blockchain.mine());
        assert!(blockchain.is_valid());

        let previous_hash = blockchain.last_block().hash().unwrap();
        let pow = ProofOfWork::new(1);
        let bad_nonce = (0..)
            .find(|nonce| !pow.valid_proof(&[], &previous_hash, *nonce).unwrap())
            .unwrap();

        blockchain.create_block(bad_nonce, previous_hash);
        assert!(!blockchain.is_valid());
    }

    #[test]
    fn test_broken_link_is_invalid() {
        let blockchain = test_chain("my_address");
        assert!(blockchain.mine());

        blockchain.create_block(0, "not the tail hash".to_string());
        assert!(!blockchain.is_valid());
    }

    #[test]
    fn test_tampered_genesis_is_invalid() {
        let blockchain = test_chain("my_address");
        assert!(blockchain.is_valid());

        blockchain.state.lock().chain[0] =
            Block::new(Vec::new(), 0, "not the empty record".to_string());
        assert!(!blockchain.is_valid());
    }

    /// Signals once the reward is queued, which happens with the ledger lock held
    struct MiningStarted {
        sender: parking_lot::Mutex<mpsc::Sender<()>>,
    }

    impl ChainObserver for MiningStarted {
        fn transaction_accepted(&self, transaction: &Transaction) {
            if transaction.is_reward("THE BLOCKCHAIN") {
                let _ = self.sender.lock().send(());
            }
        }
    }

    #[test]
    fn test_submit_during_mining_waits_for_next_block() {
        init_logger();
        let (sender, started) = mpsc::channel();
        let config = ChainConfig::default()
            .with_owner("my_address")
            .with_difficulty(3)
            .with_verification(false);
        let observer = Arc::new(MiningStarted {
            sender: parking_lot::Mutex::new(sender),
        });
        let blockchain = Arc::new(Blockchain::with_observer(config, observer).unwrap());

        let miner = {
            let blockchain = Arc::clone(&blockchain);
            thread::spawn(move || blockchain.mine_with(&CancellationToken::new()))
        };

        started.recv().unwrap();
        let submitter = {
            let blockchain = Arc::clone(&blockchain);
            thread::spawn(move || blockchain.submit("A", "B", 1.0, None, None))
        };

        let block = miner.join().unwrap().unwrap();
        assert!(submitter.join().unwrap());

        assert_eq!(
            block.transactions(),
            &[Transaction::new("THE BLOCKCHAIN", "my_address", 1.0)]
        );
        assert_eq!(
            blockchain.pending_transactions(),
            vec![Transaction::new("A", "B", 1.0)]
        );
        assert!(blockchain.is_valid());

        let next = blockchain.mine_with(&CancellationToken::new()).unwrap();
        assert_eq!(next.transactions()[0], Transaction::new("A", "B", 1.0));
        assert!(blockchain.pending_transactions().is_empty());
    }
}
