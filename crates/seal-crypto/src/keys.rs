//! Stream key lifecycle and hybrid (ECIES) key wrapping
//!
//! Wrapped key format (binary, 105 bytes):
//! ```text
//! [33 bytes: ephemeral secp256k1 public key, compressed SEC1]
//! [24 bytes: nonce][32 bytes: encrypted stream key][16 bytes: tag]
//! ```
//!
//! Key-encryption key = HKDF-SHA256(ephemeral_pub || ECDH x-coordinate,
//! info = "seal-key-wrap-v1"). The ephemeral public key is also the AAD.

use hkdf::Hkdf;
use k256::ecdh::EphemeralSecret;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use seal_core::{SealError, SealResult};

use crate::aead;
use crate::keypair::{PublicKey, SecretKey, COMPRESSED_PUBLIC_KEY_SIZE};
use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Total length of a wrapped stream key
pub const WRAPPED_KEY_SIZE: usize = COMPRESSED_PUBLIC_KEY_SIZE + NONCE_SIZE + KEY_SIZE + TAG_SIZE;

const WRAP_INFO: &[u8] = b"seal-key-wrap-v1";

/// Overwrite `buf` with random bytes, then zeros.
pub fn scrub(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
    buf.zeroize();
}

/// The 256-bit symmetric key for one encrypt/decrypt call.
///
/// Owned exclusively by that call; scrubbed on drop on every exit path.
pub struct StreamKey {
    bytes: [u8; KEY_SIZE],
}

impl StreamKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for StreamKey {
    fn drop(&mut self) {
        scrub(&mut self.bytes);
    }
}

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit stream key.
pub fn generate_stream_key() -> StreamKey {
    let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
    rand::thread_rng().fill_bytes(&mut *bytes);
    StreamKey::from_bytes(*bytes)
}

/// Generate a random Argon2id salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

fn derive_kek(ephemeral_pub: &[u8], shared_x: &[u8]) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(ephemeral_pub.len() + shared_x.len()));
    ikm.extend_from_slice(ephemeral_pub);
    ikm.extend_from_slice(shared_x);

    let hkdf = Hkdf::<Sha256>::new(None, &ikm);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(WRAP_INFO, &mut *okm).ok()?;
    Some(okm)
}

/// Wrap (encrypt) a stream key for `recipient`.
///
/// A fresh ephemeral keypair is used per call, so wrapping the same key
/// twice never produces the same bytes.
pub fn wrap_key(recipient: &PublicKey, key: &StreamKey) -> SealResult<Vec<u8>> {
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_pub = ephemeral.public_key().to_encoded_point(true);
    let shared = ephemeral.diffie_hellman(recipient);

    let shared_secret = shared.raw_secret_bytes();
    let kek = derive_kek(ephemeral_pub.as_bytes(), shared_secret.as_slice())
        .ok_or_else(|| SealError::EncryptionFailed("key wrapping: HKDF expand failed".into()))?;

    let sealed = aead::seal(&kek, ephemeral_pub.as_bytes(), key.as_bytes())
        .map_err(|e| SealError::EncryptionFailed(format!("key wrapping failed: {e}")))?;

    let mut wrapped = Vec::with_capacity(WRAPPED_KEY_SIZE);
    wrapped.extend_from_slice(ephemeral_pub.as_bytes());
    wrapped.extend_from_slice(&sealed);
    Ok(wrapped)
}

/// Unwrap (decrypt) a stream key with the recipient's private key.
///
/// Input: output of `wrap_key`. Any mismatch (wrong private key, corrupted
/// bytes, wrong length) is a `DecryptionFailed`.
pub fn unwrap_key(secret: &SecretKey, wrapped: &[u8]) -> SealResult<StreamKey> {
    if wrapped.len() != WRAPPED_KEY_SIZE {
        return Err(SealError::DecryptionFailed(format!(
            "wrapped key has wrong size: {} bytes (expected {WRAPPED_KEY_SIZE})",
            wrapped.len()
        )));
    }

    let (ephemeral_bytes, sealed) = wrapped.split_at(COMPRESSED_PUBLIC_KEY_SIZE);
    let ephemeral_pub = PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| {
        SealError::DecryptionFailed("wrapped key carries an invalid ephemeral public key".into())
    })?;

    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral_pub.as_affine());
    let kek = derive_kek(ephemeral_bytes, shared.raw_secret_bytes().as_slice())
        .ok_or_else(|| SealError::DecryptionFailed("key unwrapping: HKDF expand failed".into()))?;

    let mut plaintext = aead::open(&kek, ephemeral_bytes, sealed).map_err(|_| {
        SealError::DecryptionFailed(
            "key unwrapping failed: wrong private key or corrupted data".into(),
        )
    })?;

    if plaintext.len() != KEY_SIZE {
        scrub(&mut plaintext);
        return Err(SealError::DecryptionFailed(format!(
            "unwrapped key has wrong size: {} bytes (expected {KEY_SIZE})",
            plaintext.len()
        )));
    }

    let mut key_bytes = Zeroizing::new([0u8; KEY_SIZE]);
    key_bytes.copy_from_slice(&plaintext);
    scrub(&mut plaintext);

    Ok(StreamKey::from_bytes(*key_bytes))
}
