// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! Public surface of the on-road index: the amounts sent to an address that the
//! address has not received yet.
//!
//! The index is driven by the ledger through `LedgerEvent`s and reads the ledger
//! through the `OnRoadLedger` capability. Its state is an absolute
//! `Checkpoint` persisted every `checkpoint_interval` snapshots plus one signed
//! delta (`SignedIndex`) per recent snapshot kept in memory.
//!
//! The implementation lives in the `onroad-worker` crate.
//!
//! # Test exports
//!
//! When the crate feature `test-exports` is enabled, an in-memory ledger, a
//! mocked ledger and a small test configuration are exported.

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod checkpoint;
mod config;
mod controller;
mod error;
mod key;
mod ledger;
mod types;

pub use checkpoint::{CheckpointDeserializer, CheckpointSerializer};
pub use config::OnRoadConfig;
pub use controller::OnRoadController;
pub use error::OnRoadError;
pub use key::{
    checkpoint_height_prefix, checkpoint_key, hash_height_from_checkpoint_key, Key, OnRoadBatch,
    Value, CHECKPOINT_IDENT, CHECKPOINT_KEY_SIZE_BYTES,
};
#[cfg(any(test, feature = "test-exports"))]
pub use ledger::MockOnRoadLedger;
pub use ledger::{LedgerEvent, OnRoadLedger};
pub use types::{
    AbsoluteIndex, CacheEntry, Checkpoint, IndexStatus, OnRoadSummary, SignedIndex,
    SignedTokenBalance, TokenBalance,
};

/// Name of the on-road index among the ledger plugins, also its store directory name
pub const PLUGIN_NAME: &str = "plugin_unreceived";

#[cfg(any(test, feature = "test-exports"))]
pub mod test_exports;
