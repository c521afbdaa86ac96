// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::{ADDRESS_CORE_SIZE_BYTES, ADDRESS_SIZE_BYTES};
use crate::error::ModelsError;
use nom::{
    bytes::complete::take,
    error::{context, ContextError, ErrorKind, ParseError},
    IResult,
};
use onroad_hash::Hash;
use onroad_serialization::{Deserializer, SerializeError, Serializer};
use std::str::FromStr;

const ADDRESS_PREFIX: char = 'A';
const USER_KIND: u8 = 0;
const CONTRACT_KIND: u8 = 1;

/// Owner of an account chain.
///
/// The first `ADDRESS_CORE_SIZE_BYTES` bytes identify the account, the last byte
/// tells whether it is a user account or a contract account.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Address([u8; ADDRESS_SIZE_BYTES]);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            ADDRESS_PREFIX,
            if self.is_contract() { 'S' } else { 'U' },
            bs58::encode(self.core()).with_check().into_string()
        )
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Address {
    /// Build an address from its core bytes and its kind
    pub fn new(core: [u8; ADDRESS_CORE_SIZE_BYTES], is_contract: bool) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE_BYTES];
        bytes[..ADDRESS_CORE_SIZE_BYTES].copy_from_slice(&core);
        bytes[ADDRESS_CORE_SIZE_BYTES] = if is_contract { CONTRACT_KIND } else { USER_KIND };
        Address(bytes)
    }

    /// Derive a user address from arbitrary data (typically a public key)
    pub fn user_from_data(data: &[u8]) -> Self {
        Address::new(Self::derive_core(data), false)
    }

    /// Derive a contract address from arbitrary data (typically the creating send hash)
    pub fn contract_from_data(data: &[u8]) -> Self {
        Address::new(Self::derive_core(data), true)
    }

    fn derive_core(data: &[u8]) -> [u8; ADDRESS_CORE_SIZE_BYTES] {
        let mut core = [0u8; ADDRESS_CORE_SIZE_BYTES];
        core.copy_from_slice(&Hash::compute_from(data).to_bytes()[..ADDRESS_CORE_SIZE_BYTES]);
        core
    }

    /// true if the address belongs to a contract
    pub fn is_contract(&self) -> bool {
        self.0[ADDRESS_CORE_SIZE_BYTES] == CONTRACT_KIND
    }

    /// Identifying bytes of the address, without the kind byte
    pub fn core(&self) -> &[u8] {
        &self.0[..ADDRESS_CORE_SIZE_BYTES]
    }

    /// Serialized form of the address
    pub fn to_bytes(&self) -> &[u8; ADDRESS_SIZE_BYTES] {
        &self.0
    }

    /// Build an address from its serialized form
    pub fn from_bytes(data: &[u8; ADDRESS_SIZE_BYTES]) -> Result<Address, ModelsError> {
        match data[ADDRESS_CORE_SIZE_BYTES] {
            USER_KIND | CONTRACT_KIND => Ok(Address(*data)),
            kind => Err(ModelsError::DeserializeError(format!(
                "unknown address kind {}",
                kind
            ))),
        }
    }
}

impl FromStr for Address {
    type Err = ModelsError;

    /// ## Example
    /// ```rust
    /// # use onroad_models::address::Address;
    /// # use std::str::FromStr;
    /// let address = Address::user_from_data(b"alice");
    /// let parsed = Address::from_str(&address.to_string()).unwrap();
    /// assert_eq!(address, parsed);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let is_contract = match (chars.next(), chars.next()) {
            (Some(ADDRESS_PREFIX), Some('U')) => false,
            (Some(ADDRESS_PREFIX), Some('S')) => true,
            _ => {
                return Err(ModelsError::WrongPrefix(
                    format!("{}U or {}S", ADDRESS_PREFIX, ADDRESS_PREFIX),
                    s.chars().take(2).collect(),
                ))
            }
        };
        let decoded = bs58::decode(chars.as_str())
            .with_check(None)
            .into_vec()
            .map_err(|err| ModelsError::DeserializeError(err.to_string()))?;
        let core: [u8; ADDRESS_CORE_SIZE_BYTES] = decoded.as_slice().try_into().map_err(|_| {
            ModelsError::DeserializeError(format!("invalid address length {}", decoded.len()))
        })?;
        Ok(Address::new(core, is_contract))
    }
}

impl ::serde::Serialize for Address {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(&self.to_string())
        } else {
            s.serialize_bytes(self.to_bytes())
        }
    }
}

impl<'de> ::serde::Deserialize<'de> for Address {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Address, D::Error> {
        if d.is_human_readable() {
            struct AddressVisitor;

            impl<'de> ::serde::de::Visitor<'de> for AddressVisitor {
                type Value = Address;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("AU or AS + base58::encode(core)")
                }

                fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Address::from_str(v).map_err(E::custom)
                }
            }
            d.deserialize_str(AddressVisitor)
        } else {
            struct BytesVisitor;

            impl<'de> ::serde::de::Visitor<'de> for BytesVisitor {
                type Value = Address;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("a bytestring")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Address::from_bytes(v.try_into().map_err(E::custom)?).map_err(E::custom)
                }
            }

            d.deserialize_bytes(BytesVisitor)
        }
    }
}

/// Serializer for `Address`
#[derive(Default, Clone)]
pub struct AddressSerializer;

impl AddressSerializer {
    /// Creates a serializer for `Address`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<Address> for AddressSerializer {
    fn serialize(&self, value: &Address, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(value.to_bytes());
        Ok(())
    }
}

/// Deserializer for `Address`
#[derive(Default, Clone)]
pub struct AddressDeserializer;

impl AddressDeserializer {
    /// Creates a deserializer for `Address`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<Address> for AddressDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Address, E> {
        context("Failed Address deserialization", |input: &'a [u8]| {
            let (rest, bytes) = take::<usize, &'a [u8], E>(ADDRESS_SIZE_BYTES)(input)?;
            let bytes: &[u8; ADDRESS_SIZE_BYTES] = bytes
                .try_into()
                .map_err(|_| nom::Err::Error(E::from_error_kind(input, ErrorKind::LengthValue)))?;
            let address = Address::from_bytes(bytes)
                .map_err(|_| nom::Err::Error(E::from_error_kind(input, ErrorKind::Verify)))?;
            Ok((rest, address))
        })(buffer)
    }
}
