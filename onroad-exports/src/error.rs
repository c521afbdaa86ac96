// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines all error types for the on-road index

use displaydoc::Display;
use onroad_hash::Hash;
use onroad_models::{HashHeight, ModelsError};
use onroad_serialization::SerializeError;
use thiserror::Error;

/// On-road index error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum OnRoadError {
    /// checkpoint store I/O error: {0}
    StoreIoError(String),
    /// deserialization error: {0}
    DeserializationError(String),
    /// serialization error: {0}
    SerializationError(String),
    /// on-road amounts conflict: {0}
    ConflictError(String),
    /// no usable checkpoint at or below height {0}
    MissingCheckpoint(u64),
    /// height {0} is not in the delta cache
    HeightNotFound(u64),
    /// send block {send_hash} received by {receive_hash} not found in the ledger
    MissingSourceBlock {
        /// hash of the missing send
        send_hash: Hash,
        /// hash of the receive referencing it
        receive_hash: Hash,
    },
    /// checkpoint store rebuild failed: {0}
    RebuildFailed(String),
    /// ledger error: {0}
    LedgerError(String),
    /// configuration error: {0}
    ConfigError(String),
    /// the on-road index is not initialized
    NotInitialized,
    /// ledger at {ledger} while the on-road index is at {index}, retry once the ledger event is handled
    OutOfStep {
        /// latest snapshot of the ledger
        ledger: HashHeight,
        /// latest snapshot accounted for by the index
        index: HashHeight,
    },
}

impl OnRoadError {
    /// true if the error can be recovered from by rebuilding the checkpoint store.
    ///
    /// `OutOfStep` is transient but is not one of them: the ledger event in flight
    /// settles it, and the caller retries.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OnRoadError::MissingCheckpoint(_) | OnRoadError::HeightNotFound(_)
        )
    }
}

impl From<SerializeError> for OnRoadError {
    fn from(err: SerializeError) -> Self {
        OnRoadError::SerializationError(err.to_string())
    }
}

impl From<ModelsError> for OnRoadError {
    fn from(err: ModelsError) -> Self {
        OnRoadError::DeserializationError(err.to_string())
    }
}
