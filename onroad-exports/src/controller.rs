// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::OnRoadError;
use crate::key::OnRoadBatch;
use crate::ledger::LedgerEvent;
use crate::types::{IndexStatus, OnRoadSummary};
use onroad_models::{Address, HashHeight};
use std::collections::{BTreeMap, BTreeSet};

/// Handle on a running on-road index.
///
/// Ledger events are expected from a single writer, queries may come from any
/// thread concurrently.
pub trait OnRoadController: Send + Sync {
    /// Store name of the index
    fn name(&self) -> &'static str;

    /// Handle a ledger mutation, staging store writes in `batch`.
    ///
    /// An error must abort the ledger mutation.
    fn on_ledger_event(
        &self,
        batch: &mut OnRoadBatch,
        event: LedgerEvent<'_>,
    ) -> Result<(), OnRoadError>;

    /// Durably commit the writes staged by `on_ledger_event`
    fn flush(&self, batch: OnRoadBatch) -> Result<(), OnRoadError>;

    /// On-road totals of `address`, unconfirmed blocks included
    fn get_account_on_road(&self, address: &Address) -> Result<OnRoadSummary, OnRoadError>;

    /// On-road totals of several addresses, computed from a single view
    fn get_accounts_on_road(
        &self,
        addresses: &BTreeSet<Address>,
    ) -> Result<BTreeMap<Address, OnRoadSummary>, OnRoadError>;

    /// Latest snapshot known to the index
    fn current_hash_height(&self) -> Option<HashHeight>;

    /// Oldest and newest snapshots held by the delta cache
    fn cache_bounds(&self) -> Option<(HashHeight, HashHeight)>;

    /// Lifecycle state
    fn status(&self) -> IndexStatus;

    /// Rebuild the checkpoint store from the ledger on-road set and return the
    /// snapshot of the new checkpoint
    fn rebuild(&self) -> Result<HashHeight, OnRoadError>;
}
