// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Fixed size hash identifying account blocks and snapshot blocks.

#![warn(missing_docs)]
pub use error::HashError;
pub use hash::{Hash, HashDeserializer, HashSerializer};
pub use settings::HASH_SIZE_BYTES;

mod error;
mod hash;
mod settings;
