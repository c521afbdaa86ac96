// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines a configuration structure containing all settings for the on-road index

use crate::error::OnRoadError;
use onroad_models::config::{
    MAX_AMOUNT_BYTES, REBUILD_WORKER_COUNT, REPLAY_CHUNK_HEIGHT,
    SNAPSHOT_BAK_DAY, SNAPSHOT_BUILD_DAY_LIMIT, SNAPSHOT_CACHE_CAP_HEIGHT, SNAPSHOT_DAY_HOUR,
    SNAPSHOT_HOUR_HEIGHT,
};
use std::path::PathBuf;

/// On-road index configuration
#[derive(Debug, Clone)]
pub struct OnRoadConfig {
    /// checkpoint store directory
    pub path: PathBuf,
    /// a checkpoint is written at every height multiple of this value
    pub checkpoint_interval: u64,
    /// checkpoints older than the newest one by more than this are deleted
    pub retention_window: u64,
    /// number of snapshot deltas kept in memory
    pub cache_capacity: usize,
    /// above this distance between the current height and the nearest checkpoint,
    /// the checkpoint store is rebuilt from scratch
    pub rebuild_gap_limit: u64,
    /// number of workers of a full rebuild
    pub rebuild_worker_count: usize,
    /// number of snapshot heights read from the ledger at once during replay
    pub replay_chunk_size: u64,
    /// max number of addresses in a checkpoint
    pub max_checkpoint_addresses: u64,
    /// max number of tokens per address in a checkpoint
    pub max_checkpoint_tokens: u64,
    /// max size of a serialized amount
    pub max_amount_bytes: u64,
}

impl OnRoadConfig {
    /// Configuration of a node storing its checkpoints in `path`
    pub fn new(path: PathBuf) -> Self {
        OnRoadConfig {
            path,
            checkpoint_interval: SNAPSHOT_HOUR_HEIGHT,
            retention_window: SNAPSHOT_BAK_DAY * SNAPSHOT_HOUR_HEIGHT,
            cache_capacity: SNAPSHOT_CACHE_CAP_HEIGHT as usize,
            rebuild_gap_limit: SNAPSHOT_BUILD_DAY_LIMIT * SNAPSHOT_DAY_HOUR * SNAPSHOT_HOUR_HEIGHT,
            rebuild_worker_count: REBUILD_WORKER_COUNT,
            replay_chunk_size: REPLAY_CHUNK_HEIGHT,
            max_checkpoint_addresses: u32::MAX as u64,
            max_checkpoint_tokens: u16::MAX as u64,
            max_amount_bytes: MAX_AMOUNT_BYTES,
        }
    }

    /// true if a checkpoint must be written at `height`
    pub fn is_checkpoint_height(&self, height: u64) -> bool {
        height % self.checkpoint_interval == 0
    }

    /// Reject inconsistent settings
    pub fn check(&self) -> Result<(), OnRoadError> {
        if self.checkpoint_interval == 0 {
            return Err(OnRoadError::ConfigError(
                "checkpoint_interval must be positive".to_string(),
            ));
        }
        if self.rebuild_worker_count == 0 {
            return Err(OnRoadError::ConfigError(
                "rebuild_worker_count must be positive".to_string(),
            ));
        }
        if self.replay_chunk_size == 0 {
            return Err(OnRoadError::ConfigError(
                "replay_chunk_size must be positive".to_string(),
            ));
        }
        // a cadence checkpoint folds every delta since the previous one
        if (self.cache_capacity as u64) <= self.checkpoint_interval {
            return Err(OnRoadError::ConfigError(format!(
                "cache_capacity ({}) must exceed checkpoint_interval ({})",
                self.cache_capacity, self.checkpoint_interval
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_consistent() {
        let config = OnRoadConfig::new(PathBuf::from("plugin_unreceived"));
        config.check().unwrap();
        assert_eq!(config.checkpoint_interval, 3600);
        assert_eq!(config.retention_window, 4 * 3600);
        assert_eq!(config.cache_capacity, 7200);
        assert!(config.is_checkpoint_height(7200));
        assert!(!config.is_checkpoint_height(7201));
    }

    #[test]
    fn test_cache_must_cover_a_checkpoint_interval() {
        let mut config = OnRoadConfig::new(PathBuf::from("plugin_unreceived"));
        config.cache_capacity = 3600;
        assert_matches!(config.check(), Err(OnRoadError::ConfigError(_)));
        config.cache_capacity = 3601;
        config.replay_chunk_size = 0;
        assert_matches!(config.check(), Err(OnRoadError::ConfigError(_)));
    }
}
