// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::OnRoadConfig;
use std::path::Path;

/// Configuration used by tests: a checkpoint every 4 snapshots, 10 cached deltas
pub fn test_onroad_config(path: &Path) -> OnRoadConfig {
    OnRoadConfig {
        checkpoint_interval: 4,
        retention_window: 8,
        cache_capacity: 10,
        rebuild_gap_limit: 16,
        rebuild_worker_count: 3,
        replay_chunk_size: 3,
        ..OnRoadConfig::new(path.to_path_buf())
    }
}
