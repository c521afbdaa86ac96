// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::HashError;
use crate::settings::HASH_SIZE_BYTES;
use nom::{
    bytes::complete::take,
    error::{context, ContextError, ParseError},
    IResult,
};
use onroad_serialization::{Deserializer, SerializeError, Serializer};
use std::{convert::TryInto, str::FromStr};

/// Hash wrapper, the underlying hash type is blake3
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Default)]
pub struct Hash([u8; HASH_SIZE_BYTES]);

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl Hash {
    /// Compute a hash from data.
    ///
    /// # Example
    ///  ```
    /// # use onroad_hash::Hash;
    /// let hash = Hash::compute_from(&"hello world".as_bytes());
    /// ```
    pub fn compute_from(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// The all-zero hash, used as the previous hash of genesis blocks
    pub const fn zero() -> Self {
        Hash([0u8; HASH_SIZE_BYTES])
    }

    /// Serialize a Hash using bs58 encoding with checksum.
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    /// Serialize a Hash as bytes.
    ///
    /// # Example
    ///  ```
    /// # use onroad_hash::Hash;
    /// let hash = Hash::compute_from(&"hello world".as_bytes());
    /// let serialized = hash.to_bytes();
    /// ```
    pub fn to_bytes(&self) -> &[u8; HASH_SIZE_BYTES] {
        &self.0
    }

    /// Convert into bytes.
    pub fn into_bytes(self) -> [u8; HASH_SIZE_BYTES] {
        self.0
    }

    /// Deserialize using bs58 encoding with checksum.
    ///
    /// # Example
    ///  ```
    /// # use onroad_hash::Hash;
    /// let hash = Hash::compute_from(&"hello world".as_bytes());
    /// let serialized: String = hash.to_bs58_check();
    /// let deserialized: Hash = Hash::from_bs58_check(&serialized).unwrap();
    /// assert_eq!(hash, deserialized);
    /// ```
    pub fn from_bs58_check(data: &str) -> Result<Hash, HashError> {
        let decoded_bs58_check = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| HashError::ParsingError(format!("{}", err)))?;
        Ok(Hash::from_bytes(
            &decoded_bs58_check
                .as_slice()
                .try_into()
                .map_err(|err| HashError::ParsingError(format!("{}", err)))?,
        ))
    }

    /// Deserialize a Hash as bytes.
    pub const fn from_bytes(data: &[u8; HASH_SIZE_BYTES]) -> Hash {
        Hash(*data)
    }
}

impl ::serde::Serialize for Hash {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(&self.to_bs58_check())
        } else {
            s.serialize_bytes(self.to_bytes())
        }
    }
}

impl<'de> ::serde::Deserialize<'de> for Hash {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Hash, D::Error> {
        if d.is_human_readable() {
            struct Base58CheckVisitor;

            impl<'de> ::serde::de::Visitor<'de> for Base58CheckVisitor {
                type Value = Hash;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("an ASCII base58check string")
                }

                fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Hash::from_bs58_check(v).map_err(E::custom)
                }
            }
            d.deserialize_str(Base58CheckVisitor)
        } else {
            struct BytesVisitor;

            impl<'de> ::serde::de::Visitor<'de> for BytesVisitor {
                type Value = Hash;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("a bytestring")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Ok(Hash::from_bytes(v.try_into().map_err(E::custom)?))
                }
            }

            d.deserialize_bytes(BytesVisitor)
        }
    }
}

impl FromStr for Hash {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_bs58_check(s)
    }
}

/// Serializer for `Hash`
#[derive(Default, Clone)]
pub struct HashSerializer;

impl HashSerializer {
    /// Creates a serializer for `Hash`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<Hash> for HashSerializer {
    fn serialize(&self, value: &Hash, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend(value.to_bytes());
        Ok(())
    }
}

/// Deserializer for `Hash`
#[derive(Default, Clone)]
pub struct HashDeserializer;

impl HashDeserializer {
    /// Creates a deserializer for `Hash`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<Hash> for HashDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Hash, E> {
        context("Failed hash deserialization", |input: &'a [u8]| {
            let (rest, bytes) = take::<usize, &'a [u8], E>(HASH_SIZE_BYTES)(input)?;
            let bytes: &[u8; HASH_SIZE_BYTES] = bytes.try_into().map_err(|_| {
                nom::Err::Error(E::from_error_kind(input, nom::error::ErrorKind::LengthValue))
            })?;
            Ok((rest, Hash::from_bytes(bytes)))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onroad_serialization::DeserializeError;

    fn example() -> Hash {
        Hash::compute_from("hello world".as_bytes())
    }

    #[test]
    fn test_serde_json() {
        let hash = example();
        let serialized = serde_json::to_string(&hash).unwrap();
        let deserialized = serde_json::from_str(&serialized).unwrap();
        assert_eq!(hash, deserialized)
    }

    #[test]
    fn test_bs58_rejects_corrupted_checksum() {
        let mut encoded = example().to_bs58_check();
        let last = encoded.pop().unwrap();
        encoded.push(if last == '1' { '2' } else { '1' });
        assert!(Hash::from_str(&encoded).is_err());
    }

    #[test]
    fn test_deserializer_requires_full_hash() {
        let hash = example();
        let mut buffer = Vec::new();
        HashSerializer::new().serialize(&hash, &mut buffer).unwrap();
        buffer.push(7);
        let (rest, deserialized) = HashDeserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert_eq!(rest, &[7]);
        assert_eq!(deserialized, hash);
        assert!(HashDeserializer::new()
            .deserialize::<DeserializeError>(&buffer[..10])
            .is_err());
    }
}
