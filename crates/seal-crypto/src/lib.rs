//! seal-crypto: primitives behind the sealed stream format
//!
//! Key hierarchy:
//! ```text
//! Stream Key (256-bit, one per encrypt call, scrubbed on drop)
//!   ├── password mode:   Argon2id(password, salt[16])
//!   └── public-key mode: random, wrapped for the recipient via
//!                        ECDH(secp256k1) → HKDF-SHA256 → XChaCha20-Poly1305
//!
//! Chunk AEAD: XChaCha20-Poly1305 (key=stream key, nonce=random_192bit, AAD=chunk_idx)
//! Chunk digest: BLAKE3(plaintext), checked after the tag verifies
//! Sender signature: ECDSA/secp256k1 over BLAKE3(whole input), compact 64 bytes
//! ```

pub mod aead;
pub mod chunk;
pub mod kdf;
pub mod keypair;
pub mod keys;
pub mod sign;

pub use aead::AeadError;
pub use chunk::{ChunkCipher, ChunkRecord};
pub use kdf::{derive_stream_key, KdfParams};
pub use keypair::{
    public_key_from_bytes, public_key_from_hex, public_key_to_bytes, secret_key_from_bytes,
    secret_key_from_hex, secret_key_to_hex, validate_public_key, KeyPair, KeyValidity, PublicKey,
    SecretKey,
};
pub use keys::{
    generate_salt, generate_stream_key, scrub, unwrap_key, wrap_key, StreamKey, WRAPPED_KEY_SIZE,
};
pub use sign::{digest_bytes, sign_digest, verify_digest, InputDigest};

/// Size of a stream key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the Argon2id salt stored in password-mode headers
pub const SALT_SIZE: usize = 16;

/// Size of a compact secp256k1 signature (r || s)
pub const SIGNATURE_SIZE: usize = 64;

/// Size of a BLAKE3 digest
pub const DIGEST_SIZE: usize = 32;
