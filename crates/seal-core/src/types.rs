use serde::{Deserialize, Serialize};

/// Length of every magic tag on the wire.
pub const MAGIC_LEN: usize = 3;

/// Leading tag identifying how a sealed stream was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Magic {
    /// Symmetric key derived from a password (Argon2id)
    Password,
    /// Random stream key wrapped for a recipient public key
    PublicKey,
    /// As `PublicKey`, with a sender signature in the header
    Signed,
}

impl Magic {
    pub const ALL: [Magic; 3] = [Magic::Password, Magic::PublicKey, Magic::Signed];

    pub const fn as_bytes(&self) -> &'static [u8; MAGIC_LEN] {
        match self {
            Magic::Password => b"PWD",
            Magic::PublicKey => b"PUB",
            Magic::Signed => b"SIG",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Magic::Password => "PWD",
            Magic::PublicKey => "PUB",
            Magic::Signed => "SIG",
        }
    }

    /// Match the first `MAGIC_LEN` bytes against the known vocabulary.
    pub fn from_prefix(bytes: &[u8]) -> Option<Magic> {
        let prefix = bytes.get(..MAGIC_LEN)?;
        Magic::ALL.into_iter().find(|m| m.as_bytes() == prefix)
    }

    pub fn is_key_mode(&self) -> bool {
        !matches!(self, Magic::Password)
    }

    pub fn format(&self) -> Format {
        match self {
            Magic::Password => Format::Password,
            Magic::PublicKey => Format::PublicKey,
            Magic::Signed => Format::Signed,
        }
    }
}

impl std::fmt::Display for Magic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of sniffing the first bytes of a file or text blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    Password,
    PublicKey,
    Signed,
    Unencrypted,
}

impl Format {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Format::Unencrypted)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Format::Password => "password",
            Format::PublicKey => "publicKey",
            Format::Signed => "signed",
            Format::Unencrypted => "unencrypted",
        };
        f.write_str(s)
    }
}

/// Which secret protects the stream key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EncryptionMode {
    Password,
    PublicKey,
}

/// Plaintext framing in front of every chunk record:
/// `ciphertext_len (u32 LE) || blake3(plaintext) (32 bytes)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Ciphertext length of the chunk (nonce and tag included)
    pub size: u32,
    /// BLAKE3 digest of the plaintext chunk
    pub hash: [u8; 32],
}

impl ChunkMetadata {
    pub const LEN: usize = 4 + 32;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..].copy_from_slice(&self.hash);
        out
    }

    /// Decode from the first `LEN` bytes, or `None` if the buffer is short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf = buf.get(..Self::LEN)?;
        let mut size = [0u8; 4];
        size.copy_from_slice(&buf[..4]);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&buf[4..]);
        Some(Self {
            size: u32::from_le_bytes(size),
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_prefix_matching() {
        assert_eq!(Magic::from_prefix(b"PWD..."), Some(Magic::Password));
        assert_eq!(Magic::from_prefix(b"PUBxx"), Some(Magic::PublicKey));
        assert_eq!(Magic::from_prefix(b"SIG"), Some(Magic::Signed));
        assert_eq!(Magic::from_prefix(b"PW"), None);
        assert_eq!(Magic::from_prefix(b"pwd"), None);
        assert_eq!(Magic::from_prefix(b""), None);
    }

    #[test]
    fn test_magic_tags_are_distinct() {
        for a in Magic::ALL {
            for b in Magic::ALL {
                if a != b {
                    assert_ne!(a.as_bytes(), b.as_bytes());
                }
            }
        }
    }

    #[test]
    fn test_chunk_metadata_layout() {
        let meta = ChunkMetadata {
            size: 0x0102_0304,
            hash: [0xAA; 32],
        };
        let bytes = meta.encode();
        assert_eq!(
            &bytes[..4],
            &[0x04, 0x03, 0x02, 0x01],
            "size is little-endian"
        );
        assert_eq!(&bytes[4..], &[0xAA; 32]);
        assert_eq!(ChunkMetadata::decode(&bytes), Some(meta));
    }

    #[test]
    fn test_chunk_metadata_short_buffer() {
        assert!(ChunkMetadata::decode(&[0u8; 35]).is_none());
    }

    #[test]
    fn test_format_display() {
        assert_eq!(Format::PublicKey.to_string(), "publicKey");
        assert_eq!(Magic::Signed.format(), Format::Signed);
        assert!(!Format::Unencrypted.is_encrypted());
    }
}
