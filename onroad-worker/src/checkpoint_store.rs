// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Module persisting the on-road checkpoints
//!
//! Contains a `RocksDB` DB instance. Checkpoints are keyed by
//! `[CHECKPOINT_IDENT][height BE][hash]`, so several forks may hold a checkpoint
//! at the same height: readers only trust the one on the canonical chain.

use crate::aggregate::apply_delta;
use onroad_exports::{
    checkpoint_height_prefix, checkpoint_key, hash_height_from_checkpoint_key, AbsoluteIndex,
    Checkpoint, CheckpointDeserializer, CheckpointSerializer, Key, OnRoadBatch, OnRoadConfig,
    OnRoadError, OnRoadLedger, SignedIndex, CHECKPOINT_IDENT,
};
use onroad_hash::Hash;
use onroad_models::{Address, HashHeight};
use onroad_serialization::{DeserializeError, Deserializer, Serializer};
use rocksdb::{IteratorMode, Options, ReadOptions, WriteBatch, DB};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, warn};

const OPEN_ERROR: &str = "rocksdb open operation failed";
const DESTROY_ERROR: &str = "rocksdb destroy operation failed";
const CRUD_ERROR: &str = "rocksdb crud operation failed";
const CLOSED_ERROR: &str = "checkpoint store is closed";

/// Checkpoint store
pub(crate) struct CheckpointStore {
    /// `None` only while a rebuild recreates the database
    db: Option<DB>,
    path: PathBuf,
    retention_window: u64,
    checkpoint_serializer: CheckpointSerializer,
    checkpoint_deserializer: CheckpointDeserializer,
}

fn open_db(path: &Path) -> Result<DB, OnRoadError> {
    let mut options = Options::default();
    options.create_if_missing(true);
    DB::open(&options, path)
        .map_err(|err| OnRoadError::StoreIoError(format!("{}: {}", OPEN_ERROR, err)))
}

fn crud_error(err: rocksdb::Error) -> OnRoadError {
    OnRoadError::StoreIoError(format!("{}: {}", CRUD_ERROR, err))
}

/// Upper bound of every checkpoint key
fn checkpoint_keys_end() -> Key {
    vec![CHECKPOINT_IDENT + 1]
}

impl CheckpointStore {
    /// Open (or create) the store at `config.path`
    pub fn new(config: &OnRoadConfig) -> Result<Self, OnRoadError> {
        Ok(CheckpointStore {
            db: Some(open_db(&config.path)?),
            path: config.path.clone(),
            retention_window: config.retention_window,
            checkpoint_serializer: CheckpointSerializer::new(),
            checkpoint_deserializer: CheckpointDeserializer::new(config),
        })
    }

    fn db(&self) -> Result<&DB, OnRoadError> {
        self.db
            .as_ref()
            .ok_or_else(|| OnRoadError::StoreIoError(CLOSED_ERROR.to_string()))
    }

    /// Keys of the stored checkpoints in `[start, end)`, by ascending key
    fn keys_in_range(&self, start: Key, end: Key) -> Result<Vec<Key>, OnRoadError> {
        let mut options = ReadOptions::default();
        options.set_iterate_range(start..end);
        self.db()?
            .iterator_opt(IteratorMode::Start, options)
            .map(|item| item.map(|(key, _)| key.to_vec()).map_err(crud_error))
            .collect()
    }

    /// Snapshots of every stored checkpoint, canonical or not, by ascending height
    pub fn checkpoints(&self) -> Result<Vec<HashHeight>, OnRoadError> {
        self.keys_in_range(checkpoint_height_prefix(0), checkpoint_keys_end())?
            .iter()
            .map(|key| hash_height_from_checkpoint_key(key))
            .collect()
    }

    /// Newest checkpoint at or below `height` whose snapshot is on the canonical chain.
    ///
    /// Checkpoints of rolled back forks are skipped.
    pub fn nearest_checkpoint(
        &self,
        ledger: &dyn OnRoadLedger,
        height: u64,
    ) -> Result<Option<Checkpoint>, OnRoadError> {
        let mut options = ReadOptions::default();
        options.set_iterate_range(
            checkpoint_height_prefix(0)..checkpoint_height_prefix(height.saturating_add(1)),
        );
        for item in self.db()?.iterator_opt(IteratorMode::End, options) {
            let (key, value) = item.map_err(crud_error)?;
            let at = hash_height_from_checkpoint_key(&key)?;
            if ledger.snapshot_hash_at(at.height)? != Some(at.hash) {
                debug!("skipping checkpoint {} of a rolled back fork", at);
                continue;
            }
            let (rest, checkpoint) = self
                .checkpoint_deserializer
                .deserialize::<DeserializeError>(&value)
                .map_err(|err| OnRoadError::DeserializationError(err.to_string()))?;
            if !rest.is_empty() || checkpoint.at != at {
                return Err(OnRoadError::DeserializationError(format!(
                    "checkpoint stored under {} is corrupted",
                    at
                )));
            }
            return Ok(Some(checkpoint));
        }
        Ok(None)
    }

    /// Stage the write of `checkpoint` in `batch`, along with the deletion of the
    /// checkpoints older than the retention window
    pub fn stage_checkpoint(
        &self,
        batch: &mut OnRoadBatch,
        checkpoint: &Checkpoint,
    ) -> Result<(), OnRoadError> {
        let mut value = Vec::new();
        self.checkpoint_serializer.serialize(checkpoint, &mut value)?;
        batch.insert(checkpoint_key(&checkpoint.at), Some(value));

        let Some(cutoff) = checkpoint.at.height.checked_sub(self.retention_window) else {
            return Ok(());
        };
        let (start, end) = (checkpoint_height_prefix(0), checkpoint_height_prefix(cutoff));
        let mut expired = self.keys_in_range(start.clone(), end.clone())?;
        expired.extend(batch.range(start..end).map(|(key, _)| key.clone()));
        for key in expired {
            batch.insert(key, None);
        }
        Ok(())
    }

    /// Stage the deletion of every checkpoint at `height` or above
    pub fn stage_delete_from(&self, batch: &mut OnRoadBatch, height: u64) -> Result<(), OnRoadError> {
        let (start, end) = (checkpoint_height_prefix(height), checkpoint_keys_end());
        let mut deleted = self.keys_in_range(start.clone(), end.clone())?;
        deleted.extend(batch.range(start..end).map(|(key, _)| key.clone()));
        for key in deleted {
            batch.insert(key, None);
        }
        Ok(())
    }

    /// Durably apply `batch`
    pub fn write_batch(&self, batch: OnRoadBatch) -> Result<(), OnRoadError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut write_batch = WriteBatch::default();
        for (key, value) in batch {
            match value {
                Some(value) => write_batch.put(key, value),
                None => write_batch.delete(key),
            }
        }
        self.db()?.write(write_batch).map_err(crud_error)
    }

    /// Recreate the store with a single checkpoint computed from the on-road sends
    /// of the ledger at its latest snapshot.
    ///
    /// Recipients are split between `worker_count` threads.
    pub fn rebuild_all(
        &mut self,
        ledger: &dyn OnRoadLedger,
        worker_count: usize,
    ) -> Result<Checkpoint, OnRoadError> {
        // close before destroying
        drop(self.db.take());
        if self.path.exists() {
            DB::destroy(&Options::default(), &self.path).map_err(|err| {
                OnRoadError::StoreIoError(format!("{}: {}", DESTROY_ERROR, err))
            })?;
        }
        self.db = Some(open_db(&self.path)?);

        let at = ledger.latest_snapshot()?;
        let on_road = ledger.load_all_on_road()?;
        info!(
            "rebuilding on-road checkpoints at {} for {} addresses",
            at,
            on_road.len()
        );

        let worker_count = worker_count.max(1);
        let mut shards: Vec<Vec<(&Address, &Vec<Hash>)>> = vec![Vec::new(); worker_count];
        for (position, entry) in on_road.iter().enumerate() {
            shards[position % worker_count].push(entry);
        }

        let partials = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(worker_count);
            for (index, shard) in shards.into_iter().enumerate() {
                let handle = thread::Builder::new()
                    .name(format!("onroad-rebuild-{}", index))
                    .spawn_scoped(scope, move || rebuild_shard(ledger, shard))
                    .map_err(|err| OnRoadError::RebuildFailed(err.to_string()))?;
                handles.push(handle);
            }
            let mut partials = Vec::with_capacity(handles.len());
            for handle in handles {
                let partial = handle
                    .join()
                    .map_err(|_| {
                        OnRoadError::RebuildFailed("rebuild worker panicked".to_string())
                    })?
                    .map_err(|err| match err {
                        OnRoadError::RebuildFailed(_) => err,
                        err => OnRoadError::RebuildFailed(err.to_string()),
                    })?;
                partials.push(partial);
            }
            Ok::<_, OnRoadError>(partials)
        })?;

        // shards hold disjoint addresses
        let mut index = AbsoluteIndex::default();
        for partial in partials {
            index.0.extend(partial.0);
        }
        let checkpoint = Checkpoint { at, index };

        let mut batch = OnRoadBatch::new();
        self.stage_checkpoint(&mut batch, &checkpoint)?;
        self.write_batch(batch)?;
        info!(
            "on-road checkpoint rebuilt at {} with {} addresses",
            checkpoint.at,
            checkpoint.index.len()
        );
        Ok(checkpoint)
    }
}

/// Totals of the on-road sends of one shard of recipients
fn rebuild_shard(
    ledger: &dyn OnRoadLedger,
    shard: Vec<(&Address, &Vec<Hash>)>,
) -> Result<AbsoluteIndex, OnRoadError> {
    let mut delta = SignedIndex::default();
    for (address, hashes) in shard {
        for hash in hashes {
            let send = ledger.account_block_by_hash(hash)?.ok_or_else(|| {
                warn!("on-road send {} of {} is missing from the ledger", hash, address);
                OnRoadError::RebuildFailed(format!("on-road send {} not found", hash))
            })?;
            delta.add(*address, send.token_id, send.amount.into(), 1);
        }
    }
    let mut index = AbsoluteIndex::default();
    apply_delta(&mut index, &delta)?;
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use num::BigUint;
    use onroad_exports::MockOnRoadLedger;
    use onroad_exports::test_exports::{test_onroad_config, MemoryLedger};
    use onroad_exports::TokenBalance;
    use onroad_models::TokenId;
    use serial_test::serial;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn checkpoint(at: HashHeight, amount: u64) -> Checkpoint {
        let mut index = AbsoluteIndex::default();
        index.0.insert(
            Address::user_from_data(b"bob"),
            BTreeMap::from([(
                TokenId::from_data(b"VITE"),
                TokenBalance {
                    total_amount: BigUint::from(amount),
                    count: 1,
                },
            )]),
        );
        Checkpoint { at, index }
    }

    fn canonical(ledger: &MemoryLedger, height: u64) -> HashHeight {
        let hash = ledger.snapshot_hash_at(height).unwrap().unwrap();
        HashHeight::new(height, hash)
    }

    #[test]
    #[serial]
    fn test_nearest_checkpoint_skips_rolled_back_forks() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_onroad_config(temp_dir.path());
        let store = CheckpointStore::new(&config).unwrap();
        let ledger = MemoryLedger::new();
        for _ in 0..7 {
            ledger.snapshot();
        }

        let mut batch = OnRoadBatch::new();
        let main = checkpoint(canonical(&ledger, 4), 10);
        let orphan = checkpoint(HashHeight::new(8, Hash::compute_from(b"fork 8")), 20);
        store.stage_checkpoint(&mut batch, &main).unwrap();
        store.stage_checkpoint(&mut batch, &orphan).unwrap();
        store.write_batch(batch).unwrap();

        assert_eq!(store.nearest_checkpoint(&ledger, 8).unwrap(), Some(main.clone()));
        assert_eq!(store.nearest_checkpoint(&ledger, 4).unwrap(), Some(main));
        assert_eq!(store.nearest_checkpoint(&ledger, 3).unwrap(), None);
        assert_eq!(store.checkpoints().unwrap().len(), 2);
    }

    #[test]
    #[serial]
    fn test_retention_and_delete_from() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_onroad_config(temp_dir.path());
        let store = CheckpointStore::new(&config).unwrap();
        let at = |height: u64| HashHeight::new(height, Hash::compute_from(&height.to_be_bytes()));

        for height in [4, 8, 12] {
            let mut batch = OnRoadBatch::new();
            store
                .stage_checkpoint(&mut batch, &checkpoint(at(height), height))
                .unwrap();
            store.write_batch(batch).unwrap();
        }
        assert_eq!(store.checkpoints().unwrap(), vec![at(4), at(8), at(12)]);

        // 16 - 8 = 8: the checkpoint at 4 expires, the one at 8 stays
        let mut batch = OnRoadBatch::new();
        store
            .stage_checkpoint(&mut batch, &checkpoint(at(16), 16))
            .unwrap();
        store.write_batch(batch).unwrap();
        assert_eq!(store.checkpoints().unwrap(), vec![at(8), at(12), at(16)]);

        let mut batch = OnRoadBatch::new();
        store.stage_delete_from(&mut batch, 12).unwrap();
        store.write_batch(batch).unwrap();
        assert_eq!(store.checkpoints().unwrap(), vec![at(8)]);
    }

    #[test]
    #[serial]
    fn test_checkpoints_survive_reopening() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_onroad_config(temp_dir.path());
        let ledger = MemoryLedger::new();
        for _ in 0..3 {
            ledger.snapshot();
        }
        let written = checkpoint(canonical(&ledger, 4), 42);
        {
            let store = CheckpointStore::new(&config).unwrap();
            let mut batch = OnRoadBatch::new();
            store.stage_checkpoint(&mut batch, &written).unwrap();
            store.write_batch(batch).unwrap();
        }
        let store = CheckpointStore::new(&config).unwrap();
        assert_eq!(store.nearest_checkpoint(&ledger, 4).unwrap(), Some(written));
    }

    #[test]
    #[serial]
    fn test_rebuild_matches_a_scan_of_the_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_onroad_config(temp_dir.path());
        let mut store = CheckpointStore::new(&config).unwrap();
        let ledger = MemoryLedger::new();
        let vite = TokenId::from_data(b"VITE");
        let alice = Address::user_from_data(b"alice");

        let mut expected = AbsoluteIndex::default();
        for seed in 0u64..9 {
            let to = Address::user_from_data(&seed.to_be_bytes());
            let kept = ledger.send(alice, to, vite, 10 + seed);
            let received = ledger.send(alice, to, vite, 1_000);
            ledger.snapshot();
            ledger.receive(to, received.hash);
            expected.0.insert(
                to,
                BTreeMap::from([(
                    vite,
                    TokenBalance {
                        total_amount: kept.amount.clone(),
                        count: 1,
                    },
                )]),
            );
        }
        ledger.snapshot();

        // stale data is dropped by the rebuild
        let mut batch = OnRoadBatch::new();
        store
            .stage_checkpoint(&mut batch, &checkpoint(canonical(&ledger, 2), 5))
            .unwrap();
        store.write_batch(batch).unwrap();

        let rebuilt = store.rebuild_all(&ledger, config.rebuild_worker_count).unwrap();
        assert_eq!(rebuilt.at, ledger.latest());
        assert_eq!(rebuilt.index, expected);
        assert_eq!(store.checkpoints().unwrap(), vec![ledger.latest()]);
        assert_eq!(
            store.nearest_checkpoint(&ledger, ledger.latest().height).unwrap(),
            Some(rebuilt)
        );
    }

    #[test]
    #[serial]
    fn test_rebuild_worker_errors_become_rebuild_failed() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_onroad_config(temp_dir.path());
        let mut store = CheckpointStore::new(&config).unwrap();
        let bob = Address::user_from_data(b"bob");
        let send_hash = Hash::compute_from(b"send");

        let mut ledger = MockOnRoadLedger::new();
        ledger
            .expect_latest_snapshot()
            .returning(|| Ok(HashHeight::new(3, Hash::compute_from(b"snapshot 3"))));
        ledger
            .expect_load_all_on_road()
            .returning(move || Ok(BTreeMap::from([(bob, vec![send_hash])])));
        ledger
            .expect_account_block_by_hash()
            .returning(|_| Err(OnRoadError::LedgerError("disk unplugged".to_string())));

        assert_matches!(
            store.rebuild_all(&ledger, config.rebuild_worker_count),
            Err(OnRoadError::RebuildFailed(reason)) if reason.contains("disk unplugged")
        );
        assert!(store.checkpoints().unwrap().is_empty());
    }
}
