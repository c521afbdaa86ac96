// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Codec for arbitrary precision amounts.
//!
//! Amounts are unbounded non-negative integers (`num::BigUint`). They are stored
//! as a varint length followed by the minimal big-endian bytes; zero is stored
//! with an empty byte string.

use nom::error::{context, ContextError, ErrorKind, ParseError};
use nom::IResult;
use num::{BigUint, Zero};
use onroad_serialization::{
    Deserializer, SerializeError, Serializer, VecU8Deserializer, VecU8Serializer,
};
use std::ops::Bound::Included;

/// Serializer for `BigUint` amounts
#[derive(Clone, Default)]
pub struct AmountSerializer {
    bytes_serializer: VecU8Serializer,
}

impl AmountSerializer {
    /// Creates a `AmountSerializer`
    pub const fn new() -> Self {
        Self {
            bytes_serializer: VecU8Serializer::new(),
        }
    }
}

impl Serializer<BigUint> for AmountSerializer {
    /// ## Example
    /// ```
    /// use num::BigUint;
    /// use onroad_models::amount::AmountSerializer;
    /// use onroad_serialization::Serializer;
    ///
    /// let mut buffer = Vec::new();
    /// AmountSerializer::new().serialize(&BigUint::from(256u32), &mut buffer).unwrap();
    /// assert_eq!(buffer, vec![2, 1, 0]);
    /// ```
    fn serialize(&self, value: &BigUint, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let bytes = if value.is_zero() {
            Vec::new()
        } else {
            value.to_bytes_be()
        };
        self.bytes_serializer.serialize(&bytes, buffer)
    }
}

/// Deserializer for `BigUint` amounts
#[derive(Clone)]
pub struct AmountDeserializer {
    bytes_deserializer: VecU8Deserializer,
}

impl AmountDeserializer {
    /// Creates a `AmountDeserializer` accepting amounts of at most `max_bytes` bytes
    pub const fn new(max_bytes: u64) -> Self {
        Self {
            bytes_deserializer: VecU8Deserializer::new(Included(0), Included(max_bytes)),
        }
    }
}

impl Deserializer<BigUint> for AmountDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], BigUint, E> {
        context("Failed amount deserialization", |input: &'a [u8]| {
            let (rest, bytes) = self.bytes_deserializer.deserialize::<E>(input)?;
            // the encoding is minimal, a leading zero byte means a corrupted value
            if bytes.first() == Some(&0) {
                return Err(nom::Err::Error(E::from_error_kind(
                    input,
                    ErrorKind::Verify,
                )));
            }
            Ok((rest, BigUint::from_bytes_be(&bytes)))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_AMOUNT_BYTES;
    use onroad_serialization::DeserializeError;

    #[test]
    fn test_zero_amount_is_empty() {
        let mut buffer = Vec::new();
        AmountSerializer::new()
            .serialize(&BigUint::zero(), &mut buffer)
            .unwrap();
        assert_eq!(buffer, vec![0]);
        let (rest, amount) = AmountDeserializer::new(MAX_AMOUNT_BYTES)
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert!(amount.is_zero());
    }

    #[test]
    fn test_amount_bounds_and_canonical_form() {
        let big = BigUint::from(1u8) << 300usize;
        let mut buffer = Vec::new();
        AmountSerializer::new().serialize(&big, &mut buffer).unwrap();
        assert!(AmountDeserializer::new(MAX_AMOUNT_BYTES)
            .deserialize::<DeserializeError>(&buffer)
            .is_err());
        let (_, amount) = AmountDeserializer::new(64)
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert_eq!(amount, big);

        // leading zero byte
        assert!(AmountDeserializer::new(MAX_AMOUNT_BYTES)
            .deserialize::<DeserializeError>(&[2, 0, 1])
            .is_err());
    }
}
