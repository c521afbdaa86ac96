// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// constants of the snapshot chain and of the on-road index
pub mod constants;

pub use constants::*;
