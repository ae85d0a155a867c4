//! Deterministic collaborators for tests.

use crate::{
    error::OracleError,
    models::{FeeReceipt, GasFeeRecord},
    services::{ChainClient, GasFeeStore},
};
use async_trait::async_trait;
use ethers::types::H256;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default, Clone)]
struct MockBlock {
    transactions: Vec<H256>,
    receipts: Vec<Option<FeeReceipt>>,
}

/// In-memory chain. Blocks that were never added do not exist.
#[derive(Debug, Default)]
pub struct MockChainClient {
    latest: AtomicU64,
    blocks: Mutex<HashMap<u64, MockBlock>>,
    failing_blocks: Mutex<HashSet<u64>>,
    failing_receipts: Mutex<HashSet<u64>>,
    unavailable: bool,
    sample_calls: AtomicUsize,
    receipt_calls: AtomicUsize,
}

impl MockChainClient {
    pub fn new(latest: u64) -> Self {
        Self {
            latest: AtomicU64::new(latest),
            ..Default::default()
        }
    }

    /// Adds a block with one transaction per receipt entry.
    pub fn with_block(self, number: u64, receipts: Vec<Option<FeeReceipt>>) -> Self {
        let count = receipts.len();
        self.with_transactions(number, count).with_receipts(number, receipts)
    }

    pub fn with_transactions(self, number: u64, count: usize) -> Self {
        let transactions = (0..count)
            .map(|i| H256::from_low_u64_be(number << 16 | i as u64))
            .collect();
        self.block_mut(number, |block| block.transactions = transactions);
        self
    }

    pub fn with_receipts(self, number: u64, receipts: Vec<Option<FeeReceipt>>) -> Self {
        self.block_mut(number, |block| block.receipts = receipts);
        self
    }

    /// Every call fails as if the endpoint were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Makes lookups of `number` fail until [`Self::heal_block`] is called.
    pub fn fail_block(&self, number: u64) {
        lock(&self.failing_blocks).insert(number);
    }

    /// Makes only the receipt lookup of `number` fail; the block itself
    /// still resolves.
    pub fn fail_receipts(&self, number: u64) {
        lock(&self.failing_receipts).insert(number);
    }

    pub fn heal_block(&self, number: u64) {
        lock(&self.failing_blocks).remove(&number);
        lock(&self.failing_receipts).remove(&number);
    }

    pub fn set_latest(&self, latest: u64) {
        self.latest.store(latest, Ordering::SeqCst);
    }

    /// Number of `latest_block_number` calls, one per sample.
    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    fn block_mut(&self, number: u64, f: impl FnOnce(&mut MockBlock)) {
        let mut blocks = lock(&self.blocks);
        f(blocks.entry(number).or_default());
    }

    fn block(&self, number: u64) -> Result<MockBlock, OracleError> {
        if self.unavailable || lock(&self.failing_blocks).contains(&number) {
            return Err(OracleError::Unavailable(format!("block {number} unreachable")));
        }
        lock(&self.blocks)
            .get(&number)
            .cloned()
            .ok_or_else(|| OracleError::NotFound(format!("block {number}")))
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn latest_block_number(&self) -> Result<u64, OracleError> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(OracleError::Unavailable("endpoint down".to_string()));
        }
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn block_transactions(&self, number: u64) -> Result<Vec<H256>, OracleError> {
        Ok(self.block(number)?.transactions)
    }

    async fn block_receipts(&self, number: u64) -> Result<Vec<Option<FeeReceipt>>, OracleError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_receipts).contains(&number) {
            return Err(OracleError::Unavailable(format!("receipts of block {number} unreachable")));
        }
        Ok(self.block(number)?.receipts)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<FeeReceipt, OracleError> {
        if self.unavailable {
            return Err(OracleError::Unavailable("endpoint down".to_string()));
        }
        let blocks = lock(&self.blocks);
        blocks
            .values()
            .find_map(|block| {
                let index = block.transactions.iter().position(|tx| *tx == hash)?;
                block.receipts.get(index).copied().flatten()
            })
            .ok_or_else(|| OracleError::NotFound(format!("receipt of transaction {hash:?}")))
    }
}

/// Store whose writes always fail. Reads report nothing stored.
#[derive(Debug, Default)]
pub struct FailingGasFeeStore;

#[async_trait]
impl GasFeeStore for FailingGasFeeStore {
    async fn upsert_gas_fee(&self, record: &GasFeeRecord) -> Result<(), OracleError> {
        Err(OracleError::Persistence(format!(
            "write of chain {} rejected",
            record.chain_id
        )))
    }

    async fn get_gas_fee(&self, chain_id: u64) -> Result<GasFeeRecord, OracleError> {
        Err(OracleError::NotFound(format!("gas fee of chain {chain_id}")))
    }
}
