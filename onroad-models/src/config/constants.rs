// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Snapshot chain constants.
//!
//! The snapshot chain produces one block per second, so an hour of snapshots is
//! `SNAPSHOT_HOUR_HEIGHT` heights.

/// Number of hours in a day of snapshots
pub const SNAPSHOT_DAY_HOUR: u64 = 24;
/// Number of days of checkpoints kept behind the newest one
pub const SNAPSHOT_BAK_DAY: u64 = 4;
/// Number of snapshot heights in an hour, also the checkpoint cadence
pub const SNAPSHOT_HOUR_HEIGHT: u64 = 60 * 60;
/// Capacity of the in-memory delta cache (two hours of snapshots)
pub const SNAPSHOT_CACHE_CAP_HEIGHT: u64 = 2 * SNAPSHOT_HOUR_HEIGHT;
/// Maximum age in days of a checkpoint that can still be caught up incrementally
pub const SNAPSHOT_BUILD_DAY_LIMIT: u64 = 30;
/// Number of workers used by a full rebuild of the checkpoint store
pub const REBUILD_WORKER_COUNT: usize = 5;
/// Number of snapshot heights fetched from the ledger per replay round
pub const REPLAY_CHUNK_HEIGHT: u64 = 10;

/// Size of an address core in bytes
pub const ADDRESS_CORE_SIZE_BYTES: usize = 20;
/// Size of a serialized address in bytes (core followed by the kind byte)
pub const ADDRESS_SIZE_BYTES: usize = ADDRESS_CORE_SIZE_BYTES + 1;
/// Size of a serialized token id in bytes
pub const TOKEN_ID_SIZE_BYTES: usize = 10;
/// Maximum size in bytes of a serialized amount (256 bits)
pub const MAX_AMOUNT_BYTES: u64 = 32;
