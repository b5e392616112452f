//! Per-chunk XChaCha20-Poly1305 encryption/decryption
//!
//! Chunk record format (binary):
//! ```text
//! [4 bytes: ciphertext length, u32 LE][32 bytes: BLAKE3(plaintext)]
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = chunk_index (8 bytes, big-endian)
//! ```
//!
//! The AAD binds each chunk to its position, so swapped records fail
//! authentication. The plaintext digest is checked only after the tag
//! verifies and is reported as a separate error.

use seal_core::config::MAX_CHUNK_SIZE;
use seal_core::{ChunkMetadata, SealError, SealResult};

use crate::aead;
use crate::keys::StreamKey;

/// Largest ciphertext length a record may declare.
pub const MAX_RECORD_CIPHERTEXT: usize = MAX_CHUNK_SIZE + aead::overhead();

/// One serialized chunk: cleartext metadata followed by the sealed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub metadata: ChunkMetadata,
    /// `[nonce][ciphertext][tag]`
    pub ciphertext: Vec<u8>,
}

impl ChunkRecord {
    /// Validate a declared ciphertext length read from the stream.
    pub fn checked_len(metadata: &ChunkMetadata) -> SealResult<usize> {
        let len = metadata.size as usize;
        if len < aead::overhead() {
            return Err(SealError::InvalidFormat(format!(
                "chunk record declares {len} ciphertext bytes, below the {} byte minimum",
                aead::overhead()
            )));
        }
        if len > MAX_RECORD_CIPHERTEXT {
            return Err(SealError::InvalidFormat(format!(
                "chunk record declares {len} ciphertext bytes (max {MAX_RECORD_CIPHERTEXT})"
            )));
        }
        Ok(len)
    }

    /// Assemble a record from separately read metadata and ciphertext.
    pub fn from_parts(metadata: ChunkMetadata, ciphertext: Vec<u8>) -> SealResult<Self> {
        let expected = Self::checked_len(&metadata)?;
        if ciphertext.len() != expected {
            return Err(SealError::InvalidFormat(format!(
                "chunk record declares {expected} bytes but carries {}",
                ciphertext.len()
            )));
        }
        Ok(Self {
            metadata,
            ciphertext,
        })
    }

    /// Parse one record from the front of `buf`.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn parse(buf: &[u8]) -> SealResult<(Self, usize)> {
        let metadata = ChunkMetadata::decode(buf).ok_or_else(|| {
            SealError::InvalidFormat(format!(
                "truncated chunk metadata: {} bytes (need {})",
                buf.len(),
                ChunkMetadata::LEN
            ))
        })?;
        let len = Self::checked_len(&metadata)?;
        let end = ChunkMetadata::LEN + len;
        let ciphertext = buf.get(ChunkMetadata::LEN..end).ok_or_else(|| {
            SealError::InvalidFormat(format!(
                "truncated chunk: declared {len} ciphertext bytes, {} available",
                buf.len() - ChunkMetadata::LEN
            ))
        })?;
        Ok((
            Self {
                metadata,
                ciphertext: ciphertext.to_vec(),
            },
            end,
        ))
    }

    pub fn encoded_len(&self) -> usize {
        ChunkMetadata::LEN + self.ciphertext.len()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.metadata.encode());
        out.extend_from_slice(&self.ciphertext);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }
}

/// Chunk cipher bound to one stream key. The key is scrubbed when the
/// cipher is dropped.
#[derive(Debug)]
pub struct ChunkCipher {
    key: StreamKey,
}

impl ChunkCipher {
    pub fn new(key: StreamKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Digest, seal and frame one plaintext chunk.
    pub fn encrypt(&self, index: u64, plaintext: &[u8]) -> SealResult<ChunkRecord> {
        let hash = blake3::hash(plaintext);
        let ciphertext = aead::seal(self.key.as_bytes(), &index.to_be_bytes(), plaintext)
            .map_err(|e| SealError::EncryptionFailed(format!("chunk {index}: {e}")))?;
        let size = u32::try_from(ciphertext.len()).map_err(|_| {
            SealError::EncryptionFailed(format!(
                "chunk {index}: ciphertext of {} bytes exceeds u32",
                ciphertext.len()
            ))
        })?;

        tracing::trace!(index, plaintext = plaintext.len(), size, "chunk encrypted");

        Ok(ChunkRecord {
            metadata: ChunkMetadata {
                size,
                hash: *hash.as_bytes(),
            },
            ciphertext,
        })
    }

    /// Open one record and verify its plaintext digest.
    pub fn decrypt(&self, index: u64, record: &ChunkRecord) -> SealResult<Vec<u8>> {
        if record.metadata.size as usize != record.ciphertext.len() {
            return Err(SealError::InvalidFormat(format!(
                "chunk {index}: declared size {} does not match {} ciphertext bytes",
                record.metadata.size,
                record.ciphertext.len()
            )));
        }

        let aad = index.to_be_bytes();
        let plaintext = aead::open(self.key.as_bytes(), &aad, &record.ciphertext)
            .map_err(|_| {
                SealError::DecryptionFailed(format!(
                    "chunk {index}: invalid key, corrupted data, or out-of-order record"
                ))
            })?;

        // blake3::Hash equality is constant-time
        if blake3::hash(&plaintext) != blake3::Hash::from(record.metadata.hash) {
            return Err(SealError::ChunkIntegrityFailed { index });
        }

        Ok(plaintext)
    }
}
