// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Data model of the dual-chain ledger, as seen by the on-road index.
//!
//! Every address owns an account chain of send and receive blocks, and the
//! snapshot chain periodically confirms a prefix of every account chain.

#![warn(missing_docs)]

pub use address::{Address, AddressDeserializer, AddressSerializer};
pub use amount::{AmountDeserializer, AmountSerializer};
pub use block::{AccountBlock, BlockType};
pub use error::ModelsError;
pub use snapshot::{
    HashHeight, HashHeightDeserializer, HashHeightSerializer, SnapshotBlock, SnapshotChunk,
};
pub use token::{TokenId, TokenIdDeserializer, TokenIdSerializer};

/// addresses
pub mod address;
/// arbitrary precision amounts codec
pub mod amount;
/// account chain blocks
pub mod block;
/// node wide constants
pub mod config;
/// models error
pub mod error;
/// snapshot chain blocks
pub mod snapshot;
/// token identifiers
pub mod token;
