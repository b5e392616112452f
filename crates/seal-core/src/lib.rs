//! seal-core: types shared by every seal crate
//!
//! - `error`: the failure taxonomy every operation reports through
//! - `types`: wire-level vocabulary (magic tags, chunk metadata)
//! - `config`: `seal.toml` schema

pub mod config;
pub mod error;
pub mod types;

pub use error::{SealError, SealResult};
pub use types::{ChunkMetadata, EncryptionMode, Format, Magic};
