// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use thiserror::Error;

/// Result alias of the models crate
pub type ModelsResult<T, E = ModelsError> = core::result::Result<T, E>;

/// models error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ModelsError {
    /// onroad_hash error: {0}
    HashError(#[from] onroad_hash::HashError),
    /// Serialization error: {0}
    SerializeError(String),
    /// Deserialization error: {0}
    DeserializeError(String),
    /// buffer error: {0}
    BufferError(String),
    /// Wrong prefix: expected {0}, got {1}
    WrongPrefix(String, String),
}
