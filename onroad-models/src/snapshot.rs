// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::block::AccountBlock;
use nom::error::{context, ContextError, ParseError};
use nom::sequence::tuple;
use nom::{IResult, Parser};
use onroad_hash::{Hash, HashDeserializer, HashSerializer};
use onroad_serialization::{
    Deserializer, SerializeError, Serializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// Identity of a snapshot block.
///
/// Two entries with the same height but different hashes belong to different
/// branches of a fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashHeight {
    /// height on the snapshot chain
    pub height: u64,
    /// hash of the snapshot block
    pub hash: Hash,
}

impl HashHeight {
    /// Creates a `HashHeight`
    pub fn new(height: u64, hash: Hash) -> Self {
        HashHeight { height, hash }
    }

    /// true if this identifies the snapshot `(hash, height)`
    pub fn equals(&self, hash: &Hash, height: u64) -> bool {
        self.height == height && &self.hash == hash
    }
}

impl std::fmt::Display for HashHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{},{}]", self.height, self.hash)
    }
}

/// Header of a snapshot chain block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlock {
    /// hash of the block
    pub hash: Hash,
    /// hash of the previous snapshot block
    pub prev_hash: Hash,
    /// height on the snapshot chain
    pub height: u64,
}

impl SnapshotBlock {
    /// identity of the block
    pub fn hash_height(&self) -> HashHeight {
        HashHeight::new(self.height, self.hash)
    }
}

/// A snapshot block with the account blocks it confirms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotChunk {
    /// confirming snapshot, `None` for the chunk of still unconfirmed blocks
    pub snapshot_block: Option<SnapshotBlock>,
    /// account blocks confirmed by the snapshot
    pub account_blocks: Vec<AccountBlock>,
}

/// Serializer for `HashHeight`: varint height then hash
#[derive(Clone, Default)]
pub struct HashHeightSerializer {
    height_serializer: U64VarIntSerializer,
    hash_serializer: HashSerializer,
}

impl HashHeightSerializer {
    /// Creates a `HashHeightSerializer`
    pub const fn new() -> Self {
        Self {
            height_serializer: U64VarIntSerializer::new(),
            hash_serializer: HashSerializer::new(),
        }
    }
}

impl Serializer<HashHeight> for HashHeightSerializer {
    fn serialize(&self, value: &HashHeight, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.height_serializer.serialize(&value.height, buffer)?;
        self.hash_serializer.serialize(&value.hash, buffer)?;
        Ok(())
    }
}

/// Deserializer for `HashHeight`
#[derive(Clone)]
pub struct HashHeightDeserializer {
    height_deserializer: U64VarIntDeserializer,
    hash_deserializer: HashDeserializer,
}

impl HashHeightDeserializer {
    /// Creates a `HashHeightDeserializer`
    pub const fn new() -> Self {
        Self {
            height_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
            hash_deserializer: HashDeserializer::new(),
        }
    }
}

impl Default for HashHeightDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<HashHeight> for HashHeightDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], HashHeight, E> {
        context(
            "Failed HashHeight deserialization",
            tuple((
                context("Failed height deserialization", |input| {
                    self.height_deserializer.deserialize(input)
                }),
                context("Failed hash deserialization", |input| {
                    self.hash_deserializer.deserialize(input)
                }),
            )),
        )
        .map(|(height, hash)| HashHeight { height, hash })
        .parse(buffer)
    }
}
