// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! The on-road index: checkpoint store and delta cache driven by ledger events.
//!
//! The totals at the current snapshot are the newest canonical checkpoint folded
//! with every cached delta since it. Queries add the delta of the blocks not
//! confirmed yet on top of that.

use crate::aggregate::{apply_delta, compute_delta, fold_deltas, has_effect};
use crate::checkpoint_store::CheckpointStore;
use crate::delta_cache::DeltaCache;
use onroad_exports::{
    CacheEntry, Checkpoint, IndexStatus, LedgerEvent, OnRoadBatch, OnRoadConfig,
    OnRoadController, OnRoadError, OnRoadLedger, OnRoadSummary, SignedIndex, PLUGIN_NAME,
};
use onroad_hash::Hash;
use onroad_logging::onroad_trace;
use onroad_models::{AccountBlock, Address, HashHeight, SnapshotBlock, SnapshotChunk};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::once;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// State guarded by the coarse index lock
struct IndexState {
    store: CheckpointStore,
    /// latest snapshot the index accounts for
    current: Option<HashHeight>,
    /// entry computed before the commit of a snapshot, pushed once it succeeds
    pending: Option<CacheEntry>,
}

/// On-road index
pub(crate) struct OnRoadIndex {
    config: OnRoadConfig,
    ledger: Arc<dyn OnRoadLedger>,
    cache: DeltaCache,
    state: RwLock<IndexState>,
    /// kept apart from `state` to stay readable during a rebuild
    status: RwLock<IndexStatus>,
}

/// Lowest snapshot among rolled back chunks
fn lowest_snapshot(chunks: &[SnapshotChunk]) -> Option<&SnapshotBlock> {
    chunks
        .iter()
        .filter_map(|chunk| chunk.snapshot_block.as_ref())
        .min_by_key(|snapshot| snapshot.height)
}

impl OnRoadIndex {
    /// Open the checkpoint store. The index must then be initialized with `init`.
    pub fn new(config: OnRoadConfig, ledger: Arc<dyn OnRoadLedger>) -> Result<Self, OnRoadError> {
        let store = CheckpointStore::new(&config)?;
        Ok(OnRoadIndex {
            cache: DeltaCache::new(config.cache_capacity),
            config,
            ledger,
            state: RwLock::new(IndexState {
                store,
                current: None,
                pending: None,
            }),
            status: RwLock::new(IndexStatus::Uninitialized),
        })
    }

    /// Catch up with the latest snapshot of the ledger
    pub fn init(&self) -> Result<(), OnRoadError> {
        let mut state = self.state.write();
        let latest = self.ledger.latest_snapshot()?;
        info!("initializing the on-road index at {}", latest);
        self.prepare(&mut state, latest)?;
        *self.status.write() = IndexStatus::Ready;
        info!(
            "on-road index ready at {}",
            state.current.unwrap_or(latest)
        );
        Ok(())
    }

    /// Recreate the checkpoint store from the ledger
    fn rebuild_store(&self, state: &mut IndexState) -> Result<Checkpoint, OnRoadError> {
        *self.status.write() = IndexStatus::Rebuilding;
        self.cache.reset();
        state.pending = None;
        match state
            .store
            .rebuild_all(self.ledger.as_ref(), self.config.rebuild_worker_count)
        {
            Ok(checkpoint) => {
                *self.status.write() = if state.current.is_some() {
                    IndexStatus::Ready
                } else {
                    IndexStatus::Uninitialized
                };
                Ok(checkpoint)
            }
            Err(err) => {
                error!("on-road checkpoint rebuild failed: {}", err);
                *self.status.write() = IndexStatus::Uninitialized;
                Err(err)
            }
        }
    }

    /// Bring the cache up to `current` on top of a canonical checkpoint, rebuilding
    /// the store if there is none close enough.
    ///
    /// Returns the newest checkpoint at or below the new cache tail, whose snapshot
    /// is cached.
    fn prepare(&self, state: &mut IndexState, current: HashHeight) -> Result<Checkpoint, OnRoadError> {
        let ledger = self.ledger.as_ref();
        let checkpoint = match state.store.nearest_checkpoint(ledger, current.height)? {
            Some(checkpoint)
                if current.height - checkpoint.at.height <= self.config.rebuild_gap_limit =>
            {
                checkpoint
            }
            Some(checkpoint) => {
                warn!(
                    "nearest on-road checkpoint {} is too far below {}, rebuilding",
                    checkpoint.at, current
                );
                self.rebuild_store(state)?
            }
            None => {
                warn!("no on-road checkpoint at or below {}, rebuilding", current);
                self.rebuild_store(state)?
            }
        };
        let current = if checkpoint.at.height > current.height {
            checkpoint.at
        } else {
            current
        };

        if self
            .cache
            .exists(&checkpoint.at.hash, checkpoint.at.height)
            .is_none()
        {
            debug!("anchoring the delta cache at {}", checkpoint.at);
            self.anchor(checkpoint.at);
        }

        match self.reconcile(current)? {
            Some(slot) => self.cache.remove_after(slot),
            None => self.anchor(checkpoint.at),
        }

        let mut running = checkpoint.index.clone();
        for delta in self.cache.deltas_since(checkpoint.at.height)? {
            apply_delta(&mut running, &delta)?;
        }
        let mut base = checkpoint;
        let mut tail = self
            .cache
            .tail()
            .map(|entry| entry.at)
            .unwrap_or(base.at);
        let mut start = tail.height + 1;
        while start <= current.height {
            let end = current
                .height
                .min(start.saturating_add(self.config.replay_chunk_size.saturating_sub(1)));
            debug!("replaying snapshots {} to {}", start, end);
            let chunks = ledger.sub_ledger(start, end)?;
            if chunks.is_empty() {
                return Err(OnRoadError::LedgerError(format!(
                    "no snapshot between {} and {}",
                    start, end
                )));
            }
            let mut batch = OnRoadBatch::new();
            for chunk in chunks {
                let Some(snapshot) = chunk.snapshot_block.as_ref() else {
                    return Err(OnRoadError::LedgerError(
                        "sub ledger chunk without snapshot".to_string(),
                    ));
                };
                if snapshot.height != tail.height + 1 || snapshot.prev_hash != tail.hash {
                    return Err(OnRoadError::LedgerError(format!(
                        "snapshot {} does not follow {}",
                        snapshot.hash_height(),
                        tail
                    )));
                }
                let delta = compute_delta(ledger, &chunk.account_blocks)?;
                apply_delta(&mut running, &delta)?;
                tail = snapshot.hash_height();
                self.cache.push(CacheEntry {
                    at: tail,
                    delta: Arc::new(delta),
                });
                if self.config.is_checkpoint_height(tail.height) {
                    base = Checkpoint {
                        at: tail,
                        index: running.clone(),
                    };
                    state.store.stage_checkpoint(&mut batch, &base)?;
                    info!("on-road checkpoint replayed at {}", tail);
                }
            }
            state.store.write_batch(batch)?;
            start = tail.height + 1;
        }

        state.current = Some(tail);
        Ok(base)
    }

    /// Reset the cache to a single empty entry at `at`
    fn anchor(&self, at: HashHeight) {
        self.cache.reset();
        self.cache.push(CacheEntry {
            at,
            delta: Arc::new(SignedIndex::default()),
        });
    }

    /// Slot of the newest cached snapshot that is canonical and not above `current`
    fn reconcile(&self, current: HashHeight) -> Result<Option<usize>, OnRoadError> {
        let (Some(head), Some(tail)) = (self.cache.head(), self.cache.tail()) else {
            return Ok(None);
        };
        let mut height = tail.at.height.min(current.height);
        loop {
            let headers =
                self.ledger
                    .snapshot_blocks_by_height(height, false, self.config.replay_chunk_size)?;
            if headers.is_empty() {
                return Ok(None);
            }
            for header in &headers {
                if header.height < head.at.height {
                    return Ok(None);
                }
                if let Some(slot) = self.cache.exists(&header.hash, header.height) {
                    if header.height < tail.at.height {
                        debug!("delta cache rolled back to {}", header.hash_height());
                    }
                    return Ok(Some(slot));
                }
            }
            match headers.last().and_then(|header| header.height.checked_sub(1)) {
                Some(next) if next >= head.at.height => height = next,
                _ => return Ok(None),
            }
        }
    }

    /// Delta of the unconfirmed blocks touching the on-road totals of `addresses`
    fn unconfirmed_delta(&self, addresses: &BTreeSet<Address>) -> Result<SignedIndex, OnRoadError> {
        let mut blocks: BTreeMap<Hash, AccountBlock> = BTreeMap::new();
        for address in addresses {
            for block in self.ledger.unconfirmed_blocks(address) {
                blocks.insert(block.hash, block);
            }
        }
        for block in self.ledger.all_unconfirmed_blocks() {
            let sends_to_addresses = (block.is_send_block()
                && addresses.contains(&block.to_address))
                || block
                    .send_block_list
                    .iter()
                    .any(|generated| addresses.contains(&generated.to_address));
            if sends_to_addresses {
                blocks.insert(block.hash, block);
            }
        }
        compute_delta(self.ledger.as_ref(), blocks.values())
    }

    fn try_query(
        &self,
        state: &IndexState,
        addresses: &BTreeSet<Address>,
    ) -> Result<BTreeMap<Address, OnRoadSummary>, OnRoadError> {
        let current = state.current.ok_or(OnRoadError::NotInitialized)?;
        let checkpoint = state
            .store
            .nearest_checkpoint(self.ledger.as_ref(), current.height)?
            .ok_or(OnRoadError::MissingCheckpoint(current.height))?;
        if current.height - checkpoint.at.height > self.config.rebuild_gap_limit {
            return Err(OnRoadError::MissingCheckpoint(current.height));
        }
        if self
            .cache
            .exists(&checkpoint.at.hash, checkpoint.at.height)
            .is_none()
        {
            return Err(OnRoadError::HeightNotFound(checkpoint.at.height));
        }
        let mut deltas = self.cache.deltas_since(checkpoint.at.height)?;
        match self.cache.tail() {
            Some(tail) if tail.at == current => {}
            _ => return Err(OnRoadError::HeightNotFound(current.height)),
        }

        // between the commit of a snapshot and its post-commit event, the blocks it
        // confirms are neither unconfirmed nor cached
        let latest = self.ledger.latest_snapshot()?;
        if latest != current {
            match &state.pending {
                Some(pending) if pending.at == latest && latest.height == current.height + 1 => {
                    deltas.push(pending.delta.clone());
                }
                _ => {
                    return Err(OnRoadError::OutOfStep {
                        ledger: latest,
                        index: current,
                    })
                }
            }
        }
        let unconfirmed = self.unconfirmed_delta(addresses)?;
        let settled = self.ledger.latest_snapshot()?;
        if settled != latest {
            return Err(OnRoadError::OutOfStep {
                ledger: settled,
                index: current,
            });
        }

        let folded = fold_deltas(
            Some(addresses),
            deltas.iter().map(|delta| &**delta).chain(once(&unconfirmed)),
        );
        let mut index = checkpoint.index.restricted_to(addresses);
        if has_effect(&folded) {
            apply_delta(&mut index, &folded)?;
        }
        Ok(addresses
            .iter()
            .map(|address| {
                let balances = index.0.remove(address).unwrap_or_default();
                (*address, OnRoadSummary::new(*address, balances))
            })
            .collect())
    }

    fn insert_snapshot_block(
        &self,
        batch: &mut OnRoadBatch,
        snapshot: &SnapshotBlock,
        confirmed: &[AccountBlock],
    ) -> Result<(), OnRoadError> {
        let mut state = self.state.write();
        if state.current.is_none() {
            return Err(OnRoadError::NotInitialized);
        }
        let at = snapshot.hash_height();
        let delta = compute_delta(self.ledger.as_ref(), confirmed)?;
        if self.config.is_checkpoint_height(at.height) {
            let parent = HashHeight::new(at.height.saturating_sub(1), snapshot.prev_hash);
            let base = self.prepare(&mut state, parent)?;
            // a rebuild may already account for this snapshot
            let checkpoint = if base.at == at {
                base
            } else {
                let deltas = self.cache.deltas_since(base.at.height)?;
                let folded = fold_deltas(
                    None,
                    deltas.iter().map(|cached| &**cached).chain(once(&delta)),
                );
                let mut index = base.index;
                apply_delta(&mut index, &folded)?;
                Checkpoint { at, index }
            };
            state.store.stage_checkpoint(batch, &checkpoint)?;
            info!(
                "on-road checkpoint staged at {} with {} addresses",
                at,
                checkpoint.index.len()
            );
        }
        state.pending = Some(CacheEntry {
            at,
            delta: Arc::new(delta),
        });
        Ok(())
    }

    fn insert_snapshot_block_success(
        &self,
        snapshot: &SnapshotBlock,
        confirmed: &[AccountBlock],
    ) -> Result<(), OnRoadError> {
        let mut state = self.state.write();
        if state.current.is_none() {
            return Err(OnRoadError::NotInitialized);
        }
        let at = snapshot.hash_height();
        let pending = state.pending.take();
        if self.cache.exists(&at.hash, at.height).is_some() {
            debug!("snapshot {} is already cached", at);
            state.current = Some(at);
            return Ok(());
        }
        let entry = match pending {
            Some(entry) if entry.at == at => entry,
            _ => CacheEntry {
                at,
                delta: Arc::new(compute_delta(self.ledger.as_ref(), confirmed)?),
            },
        };
        match self.cache.tail() {
            Some(tail) if tail.at.equals(&snapshot.prev_hash, at.height.saturating_sub(1)) => {
                self.cache.push(entry);
                debug!(
                    "delta of snapshot {} cached ({}/{} entries)",
                    at,
                    self.cache.len(),
                    self.cache.capacity()
                );
            }
            _ => {
                warn!(
                    "delta cache does not end at the parent of {}, resetting it",
                    at
                );
                self.cache.reset();
            }
        }
        state.current = Some(at);
        Ok(())
    }

    fn delete_snapshot_blocks(
        &self,
        batch: &mut OnRoadBatch,
        chunks: &[SnapshotChunk],
    ) -> Result<(), OnRoadError> {
        let state = self.state.read();
        if state.current.is_none() {
            return Err(OnRoadError::NotInitialized);
        }
        let Some(lowest) = lowest_snapshot(chunks) else {
            return Ok(());
        };
        state.store.stage_delete_from(batch, lowest.height)
    }

    fn delete_snapshot_block_success(&self, chunks: &[SnapshotChunk]) -> Result<(), OnRoadError> {
        let mut state = self.state.write();
        if state.current.is_none() {
            return Err(OnRoadError::NotInitialized);
        }
        state.pending = None;
        let Some(lowest) = lowest_snapshot(chunks) else {
            return Ok(());
        };
        let parent = HashHeight::new(lowest.height.saturating_sub(1), lowest.prev_hash);
        let previous = self
            .cache
            .exists(&lowest.hash, lowest.height)
            .and_then(|slot| self.cache.previous(slot));
        match previous {
            Some(slot) => {
                self.cache.remove_after(slot);
                debug!("delta cache rolled back to {}", parent);
            }
            None if self.cache.tail().map(|tail| tail.at) == Some(parent) => {}
            None => {
                info!("deep rollback to {}, resetting the delta cache", parent);
                self.cache.reset();
            }
        }
        state.current = Some(parent);
        Ok(())
    }
}

impl OnRoadController for OnRoadIndex {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn on_ledger_event(
        &self,
        batch: &mut OnRoadBatch,
        event: LedgerEvent<'_>,
    ) -> Result<(), OnRoadError> {
        let result = match event {
            LedgerEvent::InsertSnapshotBlock {
                snapshot,
                confirmed,
            } => {
                onroad_trace!("insert_snapshot_block", {
                    "snapshot": snapshot.hash_height(),
                    "confirmed": confirmed.len()
                });
                self.insert_snapshot_block(batch, snapshot, confirmed)
            }
            LedgerEvent::InsertSnapshotBlockSuccess {
                snapshot,
                confirmed,
            } => self.insert_snapshot_block_success(snapshot, confirmed),
            LedgerEvent::DeleteSnapshotBlocks(chunks) => {
                onroad_trace!("delete_snapshot_blocks", { "chunks": chunks.len() });
                self.delete_snapshot_blocks(batch, chunks)
            }
            LedgerEvent::DeleteSnapshotBlockSuccess(chunks) => {
                self.delete_snapshot_block_success(chunks)
            }
            // unconfirmed blocks are read from the ledger at query time
            LedgerEvent::InsertAccountBlock(_)
            | LedgerEvent::DeleteAccountBlocks(_)
            | LedgerEvent::RemoveNewUnconfirmed(_) => Ok(()),
        };
        if let Err(err) = &result {
            error!("on-road index failed to handle {}: {}", event.name(), err);
        }
        result
    }

    fn flush(&self, batch: OnRoadBatch) -> Result<(), OnRoadError> {
        self.state.read().store.write_batch(batch)
    }

    fn get_account_on_road(&self, address: &Address) -> Result<OnRoadSummary, OnRoadError> {
        let addresses = BTreeSet::from([*address]);
        let mut summaries = self.get_accounts_on_road(&addresses)?;
        Ok(summaries
            .remove(address)
            .unwrap_or_else(|| OnRoadSummary::new(*address, BTreeMap::new())))
    }

    fn get_accounts_on_road(
        &self,
        addresses: &BTreeSet<Address>,
    ) -> Result<BTreeMap<Address, OnRoadSummary>, OnRoadError> {
        let state = self.state.read();
        let result = self.try_query(&state, addresses);
        drop(state);
        match result {
            Err(err) if err.is_recoverable() => {
                warn!("on-road query needs preparation: {}", err);
                let mut state = self.state.write();
                let current = state.current.ok_or(OnRoadError::NotInitialized)?;
                self.prepare(&mut state, current)?;
                self.try_query(&state, addresses)
            }
            result => result,
        }
    }

    fn current_hash_height(&self) -> Option<HashHeight> {
        self.state.read().current
    }

    fn cache_bounds(&self) -> Option<(HashHeight, HashHeight)> {
        Some((self.cache.head()?.at, self.cache.tail()?.at))
    }

    fn status(&self) -> IndexStatus {
        *self.status.read()
    }

    fn rebuild(&self) -> Result<HashHeight, OnRoadError> {
        let mut state = self.state.write();
        info!("on-road checkpoint rebuild requested");
        let checkpoint = self.rebuild_store(&mut state)?;
        self.prepare(&mut state, checkpoint.at)?;
        *self.status.write() = IndexStatus::Ready;
        Ok(checkpoint.at)
    }
}

#[cfg(test)]
impl OnRoadIndex {
    /// Canonical checkpoint at or below `height`
    pub(crate) fn checkpoint_at_or_below(&self, height: u64) -> Option<Checkpoint> {
        self.state
            .read()
            .store
            .nearest_checkpoint(self.ledger.as_ref(), height)
            .unwrap()
    }

    /// Every stored checkpoint
    pub(crate) fn stored_checkpoints(&self) -> Vec<HashHeight> {
        self.state.read().store.checkpoints().unwrap()
    }

    /// Cached deltas after `height`
    pub(crate) fn cached_deltas_since(&self, height: u64) -> Vec<Arc<SignedIndex>> {
        self.cache.deltas_since(height).unwrap()
    }

    /// Confirmed totals at the current snapshot, for every address
    pub(crate) fn confirmed_index(&self) -> onroad_exports::AbsoluteIndex {
        let current = self.current_hash_height().unwrap();
        let mut checkpoint = self.checkpoint_at_or_below(current.height).unwrap();
        let deltas = self.cached_deltas_since(checkpoint.at.height);
        let folded = fold_deltas(None, deltas.iter().map(|delta| &**delta));
        apply_delta(&mut checkpoint.index, &folded).unwrap();
        checkpoint.index
    }
}
