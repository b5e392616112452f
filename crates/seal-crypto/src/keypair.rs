//! secp256k1 keypairs: generation, parsing, and public-key validation
//!
//! Public keys travel as SEC1 bytes (33-byte compressed or 65-byte
//! uncompressed); private keys as 32 raw bytes or 64 hex chars.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::Serialize;
use zeroize::Zeroizing;

use seal_core::{SealError, SealResult};

pub use k256::{PublicKey, SecretKey};

/// Size of a raw secp256k1 private key
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of a compressed SEC1 public key
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// Size of an uncompressed SEC1 public key
pub const UNCOMPRESSED_PUBLIC_KEY_SIZE: usize = 65;

/// A secp256k1 private key with its public key.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Compressed SEC1 encoding of the public key.
    pub fn public_bytes(&self) -> Vec<u8> {
        public_key_to_bytes(&self.public)
    }

    /// Lowercase hex of the 32-byte private key.
    pub fn secret_hex(&self) -> Zeroizing<String> {
        secret_key_to_hex(&self.secret)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Parse a 32-byte raw private key.
pub fn secret_key_from_bytes(bytes: &[u8]) -> SealResult<SecretKey> {
    if bytes.len() != SECRET_KEY_SIZE {
        return Err(SealError::InvalidInput(format!(
            "private key must be {SECRET_KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    SecretKey::from_slice(bytes)
        .map_err(|_| SealError::InvalidInput("private key is not a valid secp256k1 scalar".into()))
}

/// Parse a hex private key (64 chars, optional `0x` prefix).
pub fn secret_key_from_hex(hex_str: &str) -> SealResult<SecretKey> {
    let trimmed = hex_str.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(trimmed)
            .map_err(|e| SealError::InvalidInput(format!("private key is not valid hex: {e}")))?,
    );
    secret_key_from_bytes(&bytes)
}

/// Lowercase hex of a private key, zeroized on drop.
pub fn secret_key_to_hex(secret: &SecretKey) -> Zeroizing<String> {
    Zeroizing::new(hex::encode(secret.to_bytes()))
}

/// Parse a SEC1-encoded public key.
pub fn public_key_from_bytes(bytes: &[u8]) -> SealResult<PublicKey> {
    if bytes.len() != COMPRESSED_PUBLIC_KEY_SIZE && bytes.len() != UNCOMPRESSED_PUBLIC_KEY_SIZE {
        return Err(SealError::InvalidInput(format!(
            "public key must be {COMPRESSED_PUBLIC_KEY_SIZE} or {UNCOMPRESSED_PUBLIC_KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| SealError::InvalidInput("public key is not a point on secp256k1".into()))
}

/// Parse a hex SEC1-encoded public key (optional `0x` prefix).
pub fn public_key_from_hex(hex_str: &str) -> SealResult<PublicKey> {
    let trimmed = hex_str.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(trimmed)
        .map_err(|e| SealError::InvalidInput(format!("public key is not valid hex: {e}")))?;
    public_key_from_bytes(&bytes)
}

/// Compressed SEC1 encoding.
pub fn public_key_to_bytes(public: &PublicKey) -> Vec<u8> {
    public.to_encoded_point(true).as_bytes().to_vec()
}

/// Outcome of checking a candidate recipient key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValidity {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Check whether `bytes` is a usable recipient public key.
pub fn validate_public_key(bytes: &[u8]) -> KeyValidity {
    match public_key_from_bytes(bytes) {
        Ok(_) => KeyValidity {
            is_valid: true,
            error: None,
        },
        Err(e) => KeyValidity {
            is_valid: false,
            error: Some(e.to_string()),
        },
    }
}
