// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Binary codec of the checkpoints.
//!
//! `[hash_height][address count]` then for each address
//! `[address][token count]` then for each token `[token id][count][amount]`.
//! Counts and lengths are varints.

use crate::config::OnRoadConfig;
use crate::types::{AbsoluteIndex, Checkpoint, TokenBalance};
use nom::{
    error::{context, ContextError, ParseError},
    multi::length_count,
    sequence::tuple,
    IResult, Parser,
};
use onroad_models::{
    AddressDeserializer, AddressSerializer, AmountDeserializer, AmountSerializer,
    HashHeightDeserializer, HashHeightSerializer, TokenIdDeserializer, TokenIdSerializer,
};
use onroad_serialization::{
    Deserializer, SerializeError, Serializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use std::ops::Bound::Included;

/// Serializer for `Checkpoint`
#[derive(Clone, Default)]
pub struct CheckpointSerializer {
    hash_height_serializer: HashHeightSerializer,
    u64_serializer: U64VarIntSerializer,
    address_serializer: AddressSerializer,
    token_id_serializer: TokenIdSerializer,
    amount_serializer: AmountSerializer,
}

impl CheckpointSerializer {
    /// Creates a `CheckpointSerializer`
    pub const fn new() -> Self {
        Self {
            hash_height_serializer: HashHeightSerializer::new(),
            u64_serializer: U64VarIntSerializer::new(),
            address_serializer: AddressSerializer::new(),
            token_id_serializer: TokenIdSerializer::new(),
            amount_serializer: AmountSerializer::new(),
        }
    }
}

impl Serializer<Checkpoint> for CheckpointSerializer {
    fn serialize(&self, value: &Checkpoint, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.hash_height_serializer.serialize(&value.at, buffer)?;
        self.u64_serializer
            .serialize(&(value.index.0.len() as u64), buffer)?;
        for (address, balances) in &value.index.0 {
            self.address_serializer.serialize(address, buffer)?;
            self.u64_serializer
                .serialize(&(balances.len() as u64), buffer)?;
            for (token_id, balance) in balances {
                self.token_id_serializer.serialize(token_id, buffer)?;
                self.u64_serializer.serialize(&balance.count, buffer)?;
                self.amount_serializer
                    .serialize(&balance.total_amount, buffer)?;
            }
        }
        Ok(())
    }
}

/// Deserializer for `Checkpoint`
#[derive(Clone)]
pub struct CheckpointDeserializer {
    hash_height_deserializer: HashHeightDeserializer,
    address_count_deserializer: U64VarIntDeserializer,
    token_count_deserializer: U64VarIntDeserializer,
    count_deserializer: U64VarIntDeserializer,
    address_deserializer: AddressDeserializer,
    token_id_deserializer: TokenIdDeserializer,
    amount_deserializer: AmountDeserializer,
}

impl CheckpointDeserializer {
    /// Creates a `CheckpointDeserializer` bounded by the limits of `config`
    pub fn new(config: &OnRoadConfig) -> Self {
        Self {
            hash_height_deserializer: HashHeightDeserializer::new(),
            address_count_deserializer: U64VarIntDeserializer::new(
                Included(0),
                Included(config.max_checkpoint_addresses),
            ),
            token_count_deserializer: U64VarIntDeserializer::new(
                Included(1),
                Included(config.max_checkpoint_tokens),
            ),
            count_deserializer: U64VarIntDeserializer::new(Included(1), Included(u64::MAX)),
            address_deserializer: AddressDeserializer::new(),
            token_id_deserializer: TokenIdDeserializer::new(),
            amount_deserializer: AmountDeserializer::new(config.max_amount_bytes),
        }
    }
}

impl Deserializer<Checkpoint> for CheckpointDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Checkpoint, E> {
        context(
            "Failed Checkpoint deserialization",
            tuple((
                context("Failed at deserialization", |input| {
                    self.hash_height_deserializer.deserialize(input)
                }),
                length_count(
                    context("Failed address count deserialization", |input| {
                        self.address_count_deserializer.deserialize(input)
                    }),
                    |input: &'a [u8]| {
                        tuple((
                            context("Failed address deserialization", |input| {
                                self.address_deserializer.deserialize(input)
                            }),
                            length_count(
                                context("Failed token count deserialization", |input| {
                                    self.token_count_deserializer.deserialize(input)
                                }),
                                |input: &'a [u8]| {
                                    tuple((
                                        context("Failed token id deserialization", |input| {
                                            self.token_id_deserializer.deserialize(input)
                                        }),
                                        context("Failed count deserialization", |input| {
                                            self.count_deserializer.deserialize(input)
                                        }),
                                        context("Failed amount deserialization", |input| {
                                            self.amount_deserializer.deserialize(input)
                                        }),
                                    ))(input)
                                },
                            ),
                        ))(input)
                    },
                ),
            )),
        )
        .map(|(at, addresses)| Checkpoint {
            at,
            index: AbsoluteIndex(
                addresses
                    .into_iter()
                    .map(|(address, tokens)| {
                        (
                            address,
                            tokens
                                .into_iter()
                                .map(|(token_id, count, total_amount)| {
                                    (token_id, TokenBalance { total_amount, count })
                                })
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        })
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::BigUint;
    use onroad_hash::Hash;
    use onroad_models::{Address, HashHeight, TokenId};
    use onroad_serialization::DeserializeError;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn checkpoint() -> Checkpoint {
        let mut index = AbsoluteIndex::default();
        for (seed, amount, count) in [(&b"bob"[..], 100u64, 1u64), (&b"carol"[..], 0, 2)] {
            let mut balances = BTreeMap::new();
            balances.insert(
                TokenId::from_data(b"VITE"),
                TokenBalance {
                    total_amount: BigUint::from(amount),
                    count,
                },
            );
            index.0.insert(Address::user_from_data(seed), balances);
        }
        Checkpoint {
            at: HashHeight::new(3600, Hash::compute_from(b"snapshot 3600")),
            index,
        }
    }

    #[test]
    fn test_checkpoint_codec() {
        let config = OnRoadConfig::new(PathBuf::new());
        let checkpoint = checkpoint();
        let mut buffer = Vec::new();
        CheckpointSerializer::new()
            .serialize(&checkpoint, &mut buffer)
            .unwrap();
        let (rest, deserialized) = CheckpointDeserializer::new(&config)
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(deserialized, checkpoint);
    }

    #[test]
    fn test_checkpoint_deserializer_enforces_limits() {
        let mut config = OnRoadConfig::new(PathBuf::new());
        config.max_checkpoint_addresses = 1;
        let mut buffer = Vec::new();
        CheckpointSerializer::new()
            .serialize(&checkpoint(), &mut buffer)
            .unwrap();
        assert!(CheckpointDeserializer::new(&config)
            .deserialize::<DeserializeError>(&buffer)
            .is_err());
        config.max_checkpoint_addresses = 2;
        assert!(CheckpointDeserializer::new(&config)
            .deserialize::<DeserializeError>(&buffer[..buffer.len() - 1])
            .is_err());
    }
}
