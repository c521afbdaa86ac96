// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Testing tools: an in-memory dual-chain ledger and a configuration with short
//! intervals so that checkpoints, cache wrap-around and rebuilds happen within a
//! few dozen snapshots.

mod config;
mod memory_ledger;

pub use config::test_onroad_config;
pub use memory_ledger::MemoryLedger;
