// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Seams between the ledger and the on-road index

use crate::error::OnRoadError;
use onroad_hash::Hash;
use onroad_models::{AccountBlock, Address, HashHeight, SnapshotBlock, SnapshotChunk};
use std::collections::BTreeMap;

/// Read-only view of the ledger used by the on-road index
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait OnRoadLedger: Send + Sync {
    /// Identity of the latest confirmed snapshot
    fn latest_snapshot(&self) -> Result<HashHeight, OnRoadError>;

    /// Hash of the canonical snapshot at `height`, if any
    fn snapshot_hash_at(&self, height: u64) -> Result<Option<Hash>, OnRoadError>;

    /// Up to `count` canonical snapshot headers starting at `height` (included),
    /// going up if `ascending`, down otherwise
    fn snapshot_blocks_by_height(
        &self,
        height: u64,
        ascending: bool,
        count: u64,
    ) -> Result<Vec<SnapshotBlock>, OnRoadError>;

    /// Canonical snapshots of heights `start..=end` with the blocks they confirm,
    /// by ascending height
    fn sub_ledger(&self, start: u64, end: u64) -> Result<Vec<SnapshotChunk>, OnRoadError>;

    /// Any known account block, confirmed or not
    fn account_block_by_hash(&self, hash: &Hash) -> Result<Option<AccountBlock>, OnRoadError>;

    /// true if `hash` is a block of the genesis snapshot
    fn is_genesis_account_block(&self, hash: &Hash) -> bool;

    /// Blocks of the chain of `address` not confirmed by any snapshot yet
    fn unconfirmed_blocks(&self, address: &Address) -> Vec<AccountBlock>;

    /// Every block not confirmed by any snapshot yet
    fn all_unconfirmed_blocks(&self) -> Vec<AccountBlock>;

    /// Hashes of the sends confirmed but not received as of the latest snapshot,
    /// grouped by recipient
    fn load_all_on_road(&self) -> Result<BTreeMap<Address, Vec<Hash>>, OnRoadError>;
}

/// Ledger mutation notified to the on-road index.
///
/// The pre-commit variants may stage writes in the batch and abort the ledger
/// mutation by returning an error. The `*Success` variants follow the commit.
#[derive(Debug, Clone, Copy)]
pub enum LedgerEvent<'a> {
    /// an account block was appended, not confirmed yet
    InsertAccountBlock(&'a AccountBlock),
    /// a snapshot confirming `confirmed` is about to be committed
    InsertSnapshotBlock {
        /// new snapshot
        snapshot: &'a SnapshotBlock,
        /// account blocks it confirms
        confirmed: &'a [AccountBlock],
    },
    /// the snapshot was committed
    InsertSnapshotBlockSuccess {
        /// new snapshot
        snapshot: &'a SnapshotBlock,
        /// account blocks it confirms
        confirmed: &'a [AccountBlock],
    },
    /// unconfirmed account blocks are about to be deleted
    DeleteAccountBlocks(&'a [AccountBlock]),
    /// snapshots (and the blocks they confirm) are about to be rolled back
    DeleteSnapshotBlocks(&'a [SnapshotChunk]),
    /// the rollback was committed
    DeleteSnapshotBlockSuccess(&'a [SnapshotChunk]),
    /// unconfirmed blocks were dropped after a rollback
    RemoveNewUnconfirmed(&'a [AccountBlock]),
}

impl LedgerEvent<'_> {
    /// Name of the event, for logs
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::InsertAccountBlock(_) => "insert_account_block",
            LedgerEvent::InsertSnapshotBlock { .. } => "insert_snapshot_block",
            LedgerEvent::InsertSnapshotBlockSuccess { .. } => "insert_snapshot_block_success",
            LedgerEvent::DeleteAccountBlocks(_) => "delete_account_blocks",
            LedgerEvent::DeleteSnapshotBlocks(_) => "delete_snapshot_blocks",
            LedgerEvent::DeleteSnapshotBlockSuccess(_) => "delete_snapshot_block_success",
            LedgerEvent::RemoveNewUnconfirmed(_) => "remove_new_unconfirmed",
        }
    }
}
