// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::TOKEN_ID_SIZE_BYTES;
use crate::error::ModelsError;
use nom::{
    bytes::complete::take,
    error::{context, ContextError, ErrorKind, ParseError},
    IResult,
};
use onroad_hash::Hash;
use onroad_serialization::{Deserializer, SerializeError, Serializer};
use serde_with_str::{deserialize_from_str, serialize_to_str};
use std::str::FromStr;

const TOKEN_ID_PREFIX: &str = "TK";

/// Identifier of a token transferred by send blocks
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub struct TokenId([u8; TOKEN_ID_SIZE_BYTES]);

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            TOKEN_ID_PREFIX,
            bs58::encode(self.0).with_check().into_string()
        )
    }
}

impl std::fmt::Debug for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl TokenId {
    /// Derive a token id from arbitrary data (typically the issuing block hash)
    pub fn from_data(data: &[u8]) -> Self {
        let mut bytes = [0u8; TOKEN_ID_SIZE_BYTES];
        bytes.copy_from_slice(&Hash::compute_from(data).to_bytes()[..TOKEN_ID_SIZE_BYTES]);
        TokenId(bytes)
    }

    /// Serialized form of the token id
    pub fn to_bytes(&self) -> &[u8; TOKEN_ID_SIZE_BYTES] {
        &self.0
    }

    /// Build a token id from its serialized form
    pub const fn from_bytes(data: &[u8; TOKEN_ID_SIZE_BYTES]) -> Self {
        TokenId(*data)
    }
}

impl FromStr for TokenId {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(encoded) = s.strip_prefix(TOKEN_ID_PREFIX) else {
            return Err(ModelsError::WrongPrefix(
                TOKEN_ID_PREFIX.to_string(),
                s.chars().take(TOKEN_ID_PREFIX.len()).collect(),
            ));
        };
        let decoded = bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|err| ModelsError::DeserializeError(err.to_string()))?;
        let bytes: [u8; TOKEN_ID_SIZE_BYTES] = decoded.as_slice().try_into().map_err(|_| {
            ModelsError::DeserializeError(format!("invalid token id length {}", decoded.len()))
        })?;
        Ok(TokenId(bytes))
    }
}

impl ::serde::Serialize for TokenId {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serialize_to_str(self, s)
    }
}

impl<'de> ::serde::Deserialize<'de> for TokenId {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<TokenId, D::Error> {
        deserialize_from_str(d)
    }
}

mod serde_with_str {
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize_to_str<T: Display, S: ::serde::Serializer>(
        value: &T,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize_from_str<'de, T, D>(d: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: ::serde::Deserializer<'de>,
    {
        let s: String = ::serde::Deserialize::deserialize(d)?;
        T::from_str(&s).map_err(::serde::de::Error::custom)
    }
}

/// Serializer for `TokenId`
#[derive(Default, Clone)]
pub struct TokenIdSerializer;

impl TokenIdSerializer {
    /// Creates a serializer for `TokenId`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<TokenId> for TokenIdSerializer {
    fn serialize(&self, value: &TokenId, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(value.to_bytes());
        Ok(())
    }
}

/// Deserializer for `TokenId`
#[derive(Default, Clone)]
pub struct TokenIdDeserializer;

impl TokenIdDeserializer {
    /// Creates a deserializer for `TokenId`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<TokenId> for TokenIdDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], TokenId, E> {
        context("Failed TokenId deserialization", |input: &'a [u8]| {
            let (rest, bytes) = take::<usize, &'a [u8], E>(TOKEN_ID_SIZE_BYTES)(input)?;
            let bytes: &[u8; TOKEN_ID_SIZE_BYTES] = bytes
                .try_into()
                .map_err(|_| nom::Err::Error(E::from_error_kind(input, ErrorKind::LengthValue)))?;
            Ok((rest, TokenId::from_bytes(bytes)))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_id_text_form() {
        let token = TokenId::from_data(b"VITE");
        let text = token.to_string();
        assert!(text.starts_with(TOKEN_ID_PREFIX));
        assert_eq!(TokenId::from_str(&text).unwrap(), token);
        assert!(TokenId::from_str(&text[1..]).is_err());
    }

    #[test]
    fn test_token_id_serde_json() {
        let token = TokenId::from_data(b"VITE");
        let serialized = serde_json::to_string(&token).unwrap();
        assert_eq!(serialized, format!("\"{}\"", token));
        let deserialized: TokenId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(token, deserialized);
    }
}
