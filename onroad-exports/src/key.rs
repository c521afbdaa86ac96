// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Layout of the checkpoint store keys: `[CHECKPOINT_IDENT][height: u64 BE][hash]`.
//!
//! Big-endian heights make the lexicographic order of the keys follow the height
//! order, so range scans walk checkpoints by height.

use crate::error::OnRoadError;
use onroad_hash::{Hash, HASH_SIZE_BYTES};
use onroad_models::HashHeight;
use std::collections::BTreeMap;

/// Prefix of the checkpoint keys
pub const CHECKPOINT_IDENT: u8 = 3u8;

/// Size of a checkpoint key
pub const CHECKPOINT_KEY_SIZE_BYTES: usize = 1 + 8 + HASH_SIZE_BYTES;

/// Key of the checkpoint store
pub type Key = Vec<u8>;

/// Serialized value of the checkpoint store
pub type Value = Vec<u8>;

/// Pending writes of the checkpoint store: `Some` puts, `None` deletes
pub type OnRoadBatch = BTreeMap<Key, Option<Value>>;

/// Key of the checkpoint taken at `at`
pub fn checkpoint_key(at: &HashHeight) -> Key {
    let mut key = checkpoint_height_prefix(at.height);
    key.extend_from_slice(at.hash.to_bytes());
    key
}

/// Prefix shared by every checkpoint taken at `height`, also the lower bound of
/// the keys at that height
pub fn checkpoint_height_prefix(height: u64) -> Key {
    let mut key = Vec::with_capacity(CHECKPOINT_KEY_SIZE_BYTES);
    key.push(CHECKPOINT_IDENT);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Read back the snapshot identity from a checkpoint key
pub fn hash_height_from_checkpoint_key(key: &[u8]) -> Result<HashHeight, OnRoadError> {
    if key.len() != CHECKPOINT_KEY_SIZE_BYTES || key[0] != CHECKPOINT_IDENT {
        return Err(OnRoadError::DeserializationError(format!(
            "invalid checkpoint key of {} bytes",
            key.len()
        )));
    }
    let mut height = [0u8; 8];
    height.copy_from_slice(&key[1..9]);
    let mut hash = [0u8; HASH_SIZE_BYTES];
    hash.copy_from_slice(&key[9..]);
    Ok(HashHeight::new(
        u64::from_be_bytes(height),
        Hash::from_bytes(&hash),
    ))
}
