//! Key derivation: Argon2id password → stream key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use seal_core::{SealError, SealResult};

use crate::keys::StreamKey;
use crate::{KEY_SIZE, SALT_SIZE};

/// Argon2id parameters for KDF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost_kib: u32,
    /// Time cost / iterations
    pub time_cost: u32,
    /// Parallelism
    pub parallelism: u32,
}

impl KdfParams {
    /// Cost parameters of the sealed format. Not stored in headers:
    /// changing them makes existing password streams undecryptable.
    pub const PROTOCOL: KdfParams = KdfParams {
        mem_cost_kib: 65536,
        time_cost: 3,
        parallelism: 4,
    };
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::PROTOCOL
    }
}

/// Derive a 256-bit stream key from a password and salt using Argon2id.
///
/// The salt is 16 random bytes stored in the clear in the header.
pub fn derive_stream_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> SealResult<StreamKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| SealError::InvalidInput(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut *key)
        .map_err(|e| SealError::EncryptionFailed(format!("Argon2id KDF failed: {e}")))?;

    Ok(StreamKey::from_bytes(*key))
}
