// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! This crate implements the on-road index: for every address, the amount and the
//! number of sends it has not received yet, per token.
//!
//! The index is a ledger plugin. It is notified of every snapshot confirmation and
//! rollback through `LedgerEvent`s and reads the ledger through `OnRoadLedger`
//! (see the `onroad-exports` crate).
//!
//! # Architecture
//!
//! ## `aggregate.rs`
//! Pure computations: the signed delta caused by confirming a batch of account blocks,
//! the fold of several deltas and their application onto absolute totals.
//!
//! ## `delta_cache.rs`
//! Ring buffer of the deltas of the latest snapshots, indexed by height.
//! Rollbacks truncate it instead of recomputing anything.
//!
//! ## `checkpoint_store.rs`
//! RocksDB store of absolute checkpoints, written every `checkpoint_interval`
//! snapshots. It can be rebuilt from scratch from the ledger on-road set.
//!
//! ## `onroad_index.rs`
//! Ties the cache and the store together, reacts to ledger events and answers
//! `get_account_on_road` queries.

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod aggregate;
mod checkpoint_store;
mod delta_cache;
mod onroad_index;

use onroad_exports::{OnRoadConfig, OnRoadController, OnRoadError, OnRoadLedger};
use onroad_index::OnRoadIndex;
use std::sync::Arc;
use tracing::info;

/// Open the checkpoint store of `config`, catch up with the latest snapshot of
/// `ledger` and return a handle on the running index.
pub fn start_onroad_index(
    config: OnRoadConfig,
    ledger: Arc<dyn OnRoadLedger>,
) -> Result<Box<dyn OnRoadController>, OnRoadError> {
    config.check()?;
    info!("starting the on-road index in {}", config.path.display());
    let index = OnRoadIndex::new(config, ledger)?;
    index.init()?;
    Ok(Box::new(index))
}

#[cfg(test)]
mod tests;
