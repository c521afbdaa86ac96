// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::onroad_index::OnRoadIndex;
use onroad_exports::test_exports::{test_onroad_config, MemoryLedger};
use onroad_exports::{
    AbsoluteIndex, LedgerEvent, OnRoadBatch, OnRoadController, OnRoadError, OnRoadLedger,
};
use onroad_hash::Hash;
use onroad_models::{AccountBlock, Address, HashHeight, SnapshotBlock, SnapshotChunk, TokenId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub fn alice() -> Address {
    Address::user_from_data(b"alice")
}

pub fn bob() -> Address {
    Address::user_from_data(b"bob")
}

pub fn carol() -> Address {
    Address::user_from_data(b"carol")
}

pub fn vite() -> TokenId {
    TokenId::from_data(b"VITE")
}

/// Index over an in-memory ledger, with its store in a temporary folder
pub struct TestIndex {
    pub index: OnRoadIndex,
    pub ledger: Arc<MemoryLedger>,
    temp_dir: TempDir,
}

impl TestIndex {
    /// Initialized index over a fresh ledger
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Unable to create a temp folder");
        Self::with_ledger(Arc::new(MemoryLedger::new()), temp_dir)
    }

    /// Initialized index over `ledger`, storing its checkpoints in `temp_dir`
    pub fn with_ledger(ledger: Arc<MemoryLedger>, temp_dir: TempDir) -> Self {
        let config = test_onroad_config(temp_dir.path());
        let index = OnRoadIndex::new(config, ledger.clone()).unwrap();
        index.init().unwrap();
        TestIndex {
            index,
            ledger,
            temp_dir,
        }
    }

    /// Close the index, keeping its store and its ledger
    pub fn close(self) -> (Arc<MemoryLedger>, TempDir) {
        (self.ledger, self.temp_dir)
    }

    /// Notify the index of `event` and flush the resulting batch
    pub fn notify(&self, event: LedgerEvent<'_>) {
        let mut batch = OnRoadBatch::new();
        self.index.on_ledger_event(&mut batch, event).unwrap();
        self.index.flush(batch).unwrap();
    }

    /// Confirm the unconfirmed blocks in a new snapshot, notifying the index
    /// before and after the commit
    pub fn confirm(&self) -> SnapshotChunk {
        let chunk = self.ledger.prepare_snapshot();
        let snapshot = chunk.snapshot_block.as_ref().unwrap();
        self.notify(LedgerEvent::InsertSnapshotBlock {
            snapshot,
            confirmed: &chunk.account_blocks,
        });
        self.ledger.commit_snapshot(&chunk);
        self.notify(LedgerEvent::InsertSnapshotBlockSuccess {
            snapshot,
            confirmed: &chunk.account_blocks,
        });
        chunk
    }

    /// Confirm `count` empty snapshots
    pub fn confirm_empty(&self, count: u64) {
        for _ in 0..count {
            self.confirm();
        }
    }

    /// Roll the ledger back to `height`, notifying the index
    pub fn roll_back_to(&self, height: u64) {
        let chunks = self
            .ledger
            .sub_ledger(height + 1, self.ledger.latest().height)
            .unwrap();
        self.notify(LedgerEvent::DeleteSnapshotBlocks(&chunks));
        let removed = self.ledger.rollback_to(height);
        assert_eq!(removed, chunks);
        self.notify(LedgerEvent::DeleteSnapshotBlockSuccess(&chunks));
    }

    /// On-road totals of the ledger computed from scratch
    pub fn brute_force(&self) -> AbsoluteIndex {
        brute_force(&self.ledger)
    }
}

/// On-road totals of `ledger` at its latest snapshot, from its on-road sends
pub fn brute_force(ledger: &MemoryLedger) -> AbsoluteIndex {
    let mut index = AbsoluteIndex::default();
    for (address, hashes) in ledger.load_all_on_road().unwrap() {
        for hash in hashes {
            let send = ledger.account_block_by_hash(&hash).unwrap().unwrap();
            let balance = index
                .0
                .entry(address)
                .or_default()
                .entry(send.token_id)
                .or_default();
            balance.total_amount += &send.amount;
            balance.count += 1;
        }
    }
    index
}

/// Ledger that can lose track of the sends it reports as on the road
pub struct FaultyLedger {
    inner: Arc<MemoryLedger>,
    losing_sends: AtomicBool,
}

impl FaultyLedger {
    pub fn new(inner: Arc<MemoryLedger>) -> Self {
        FaultyLedger {
            inner,
            losing_sends: AtomicBool::new(false),
        }
    }

    pub fn set_losing_sends(&self, losing: bool) {
        self.losing_sends.store(losing, Ordering::SeqCst);
    }
}

impl OnRoadLedger for FaultyLedger {
    fn latest_snapshot(&self) -> Result<HashHeight, OnRoadError> {
        self.inner.latest_snapshot()
    }

    fn snapshot_hash_at(&self, height: u64) -> Result<Option<Hash>, OnRoadError> {
        self.inner.snapshot_hash_at(height)
    }

    fn snapshot_blocks_by_height(
        &self,
        height: u64,
        ascending: bool,
        count: u64,
    ) -> Result<Vec<SnapshotBlock>, OnRoadError> {
        self.inner.snapshot_blocks_by_height(height, ascending, count)
    }

    fn sub_ledger(&self, start: u64, end: u64) -> Result<Vec<SnapshotChunk>, OnRoadError> {
        self.inner.sub_ledger(start, end)
    }

    fn account_block_by_hash(&self, hash: &Hash) -> Result<Option<AccountBlock>, OnRoadError> {
        if self.losing_sends.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.account_block_by_hash(hash)
    }

    fn is_genesis_account_block(&self, hash: &Hash) -> bool {
        self.inner.is_genesis_account_block(hash)
    }

    fn unconfirmed_blocks(&self, address: &Address) -> Vec<AccountBlock> {
        self.inner.unconfirmed_blocks(address)
    }

    fn all_unconfirmed_blocks(&self) -> Vec<AccountBlock> {
        self.inner.all_unconfirmed_blocks()
    }

    fn load_all_on_road(&self) -> Result<BTreeMap<Address, Vec<Hash>>, OnRoadError> {
        self.inner.load_all_on_road()
    }
}
