// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Binary codecs shared by the on-road crates.
//!
//! Every persisted type gets a dedicated `XSerializer` / `XDeserializer` pair
//! implementing the traits below. Deserializers are nom parsers that are generic
//! over the error type, so callers choose between the cheap `nom::error::Error`
//! and the context-collecting `DeserializeError`.

#![warn(missing_docs)]

use displaydoc::Display;
use nom::error::{context, ContextError, ErrorKind, ParseError};
use nom::IResult;
use std::fmt;
use std::ops::{Bound, RangeBounds};
use thiserror::Error;

/// Errors raised while serializing
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone)]
pub enum SerializeError {
    /// Number {0} is too big to be serialized
    NumberTooBig(String),
    /// General error {0}
    GeneralError(String),
}

/// Serialize a value of type `T` at the end of a buffer
pub trait Serializer<T> {
    /// Append the binary representation of `value` to `buffer`
    fn serialize(&self, value: &T, buffer: &mut Vec<u8>) -> Result<(), SerializeError>;
}

/// Deserialize a value of type `T` from the start of a buffer
pub trait Deserializer<T> {
    /// Parse a `T` from `buffer` and return it with the remaining bytes
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], T, E>;
}

/// nom error type keeping every context pushed while unwinding a failed parse
#[derive(Debug, Default)]
pub struct DeserializeError<'a> {
    errors: Vec<(&'a [u8], String)>,
}

impl<'a> ParseError<&'a [u8]> for DeserializeError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self {
            errors: vec![(input, kind.description().to_string())],
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, kind.description().to_string()));
        other
    }
}

impl<'a> ContextError<&'a [u8]> for DeserializeError<'a> {
    fn add_context(input: &'a [u8], ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, ctx.to_string()));
        other
    }
}

impl fmt::Display for DeserializeError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.errors.len().saturating_sub(1);
        for (i, (input, message)) in self.errors.iter().enumerate() {
            write!(f, "{} (remaining {} bytes)", message, input.len())?;
            if i != last {
                write!(f, " / ")?;
            }
        }
        Ok(())
    }
}

/// Serializer for `u64` as an unsigned LEB128 varint
#[derive(Debug, Clone, Default)]
pub struct U64VarIntSerializer;

impl U64VarIntSerializer {
    /// Creates a `U64VarIntSerializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<u64> for U64VarIntSerializer {
    fn serialize(&self, value: &u64, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(unsigned_varint::encode::u64(
            *value,
            &mut unsigned_varint::encode::u64_buffer(),
        ));
        Ok(())
    }
}

/// Deserializer for varint encoded `u64`, rejecting values outside of `range`
#[derive(Debug, Clone)]
pub struct U64VarIntDeserializer {
    range: (Bound<u64>, Bound<u64>),
}

impl U64VarIntDeserializer {
    /// Creates a `U64VarIntDeserializer` accepting values within the given bounds
    pub const fn new(min: Bound<u64>, max: Bound<u64>) -> Self {
        Self { range: (min, max) }
    }
}

impl Deserializer<u64> for U64VarIntDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], u64, E> {
        context("Failed u64 deserialization", |input: &'a [u8]| {
            let (rest, value) = unsigned_varint::nom::u64(input)
                .map_err(|_| nom::Err::Error(E::from_error_kind(input, ErrorKind::Fail)))?;
            if !self.range.contains(&value) {
                return Err(nom::Err::Error(E::from_error_kind(
                    input,
                    ErrorKind::TooLarge,
                )));
            }
            Ok((rest, value))
        })(buffer)
    }
}

/// Serializer for a length prefixed byte vector
#[derive(Debug, Clone, Default)]
pub struct VecU8Serializer {
    len_serializer: U64VarIntSerializer,
}

impl VecU8Serializer {
    /// Creates a `VecU8Serializer`
    pub const fn new() -> Self {
        Self {
            len_serializer: U64VarIntSerializer::new(),
        }
    }
}

impl Serializer<Vec<u8>> for VecU8Serializer {
    fn serialize(&self, value: &Vec<u8>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let len: u64 = value.len().try_into().map_err(|_| {
            SerializeError::NumberTooBig(format!("byte vector of length {}", value.len()))
        })?;
        self.len_serializer.serialize(&len, buffer)?;
        buffer.extend_from_slice(value);
        Ok(())
    }
}

/// Deserializer for a length prefixed byte vector
#[derive(Debug, Clone)]
pub struct VecU8Deserializer {
    len_deserializer: U64VarIntDeserializer,
}

impl VecU8Deserializer {
    /// Creates a `VecU8Deserializer` accepting lengths within the given bounds
    pub const fn new(min_length: Bound<u64>, max_length: Bound<u64>) -> Self {
        Self {
            len_deserializer: U64VarIntDeserializer::new(min_length, max_length),
        }
    }
}

impl Deserializer<Vec<u8>> for VecU8Deserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<u8>, E> {
        context("Failed Vec<u8> deserialization", |input: &'a [u8]| {
            let (rest, len) = self.len_deserializer.deserialize::<E>(input)?;
            let len = usize::try_from(len)
                .map_err(|_| nom::Err::Error(E::from_error_kind(input, ErrorKind::TooLarge)))?;
            if rest.len() < len {
                return Err(nom::Err::Error(E::from_error_kind(rest, ErrorKind::Eof)));
            }
            Ok((&rest[len..], rest[..len].to_vec()))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound::Included;

    #[test]
    fn varint_rejects_out_of_range_values() {
        let mut buffer = Vec::new();
        U64VarIntSerializer::new()
            .serialize(&300, &mut buffer)
            .unwrap();
        let deserializer = U64VarIntDeserializer::new(Included(0), Included(299));
        assert!(deserializer
            .deserialize::<DeserializeError>(&buffer)
            .is_err());

        let deserializer = U64VarIntDeserializer::new(Included(0), Included(300));
        let (rest, value) = deserializer
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(value, 300);
    }

    #[test]
    fn vec_u8_reports_truncated_input() {
        let mut buffer = Vec::new();
        VecU8Serializer::new()
            .serialize(&vec![1, 2, 3, 4], &mut buffer)
            .unwrap();
        buffer.truncate(buffer.len() - 1);
        let deserializer = VecU8Deserializer::new(Included(0), Included(16));
        let err = deserializer
            .deserialize::<DeserializeError>(&buffer)
            .unwrap_err();
        assert!(err.to_string().contains("Failed Vec<u8> deserialization"));
    }
}
