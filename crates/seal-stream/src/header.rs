//! Stream header codec
//!
//! Header format (binary):
//! ```text
//! [3 bytes: magic, "PWD" | "PUB" | "SIG"]
//! [2 bytes: total header length, u16 LE, counting every header byte]
//! password mode:   [16 bytes: Argon2id salt]
//! public-key mode: [2 bytes: wrapped key length, u16 LE][N bytes: wrapped key]
//! [24 bytes: nonce][N bytes: HeaderData JSON ciphertext][16 bytes: tag]
//! ```
//!
//! The HeaderData payload is sealed under the stream key with the magic tag
//! as AAD, so a header cannot be relabelled to another mode.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use seal_core::types::MAGIC_LEN;
use seal_core::{Magic, SealError, SealResult};
use seal_crypto::{aead, derive_stream_key, unwrap_key, KdfParams, SecretKey, StreamKey};
use seal_crypto::{SALT_SIZE, SIGNATURE_SIZE};

/// Magic tag plus the total-length field.
pub const FIXED_LEN: usize = MAGIC_LEN + 2;

/// Longest original extension a header may record.
pub const MAX_EXTENSION_LEN: usize = 255;

/// Metadata sealed inside every header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderData {
    /// Original file extension, without the dot
    pub extension: String,
    /// Number of chunk records following the header
    pub chunk_count: u64,
    /// Sender signature, present only in signed streams
    pub signature: Option<[u8; SIGNATURE_SIZE]>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderPayload {
    extension: String,
    chunk_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl HeaderData {
    fn to_json(&self) -> SealResult<Vec<u8>> {
        let payload = HeaderPayload {
            extension: self.extension.clone(),
            chunk_count: self.chunk_count,
            signature: self.signature.map(|s| BASE64.encode(s)),
        };
        serde_json::to_vec(&payload)
            .map_err(|e| SealError::EncryptionFailed(format!("serializing header: {e}")))
    }

    fn from_json(bytes: &[u8]) -> SealResult<Self> {
        let payload: HeaderPayload = serde_json::from_slice(bytes)
            .map_err(|e| SealError::InvalidFormat(format!("header metadata: {e}")))?;

        let signature = match payload.signature {
            None => None,
            Some(encoded) => {
                let raw = BASE64
                    .decode(encoded)
                    .map_err(|e| SealError::InvalidFormat(format!("header signature: {e}")))?;
                let sig: [u8; SIGNATURE_SIZE] = raw.try_into().map_err(|raw: Vec<u8>| {
                    SealError::InvalidFormat(format!(
                        "header signature is {} bytes (expected {SIGNATURE_SIZE})",
                        raw.len()
                    ))
                })?;
                Some(sig)
            }
        };

        Ok(Self {
            extension: payload.extension,
            chunk_count: payload.chunk_count,
            signature,
        })
    }
}

/// Mode-specific key material stored in clear between the length field and
/// the sealed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Salt for Argon2id; the key itself is never stored
    Password { salt: [u8; SALT_SIZE] },
    /// Stream key wrapped for the recipient's public key
    Wrapped { wrapped_key: Vec<u8> },
}

impl KeyMaterial {
    /// Magic tag for this material, signed or not.
    pub fn magic(&self, signed: bool) -> SealResult<Magic> {
        match (self, signed) {
            (KeyMaterial::Password { .. }, false) => Ok(Magic::Password),
            (KeyMaterial::Password { .. }, true) => Err(SealError::InvalidInput(
                "sender signatures require public-key mode".into(),
            )),
            (KeyMaterial::Wrapped { .. }, false) => Ok(Magic::PublicKey),
            (KeyMaterial::Wrapped { .. }, true) => Ok(Magic::Signed),
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> SealResult<()> {
        match self {
            KeyMaterial::Password { salt } => out.extend_from_slice(salt),
            KeyMaterial::Wrapped { wrapped_key } => {
                let len = u16::try_from(wrapped_key.len()).map_err(|_| {
                    SealError::EncryptionFailed(format!(
                        "wrapped key of {} bytes does not fit the header",
                        wrapped_key.len()
                    ))
                })?;
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(wrapped_key);
            }
        }
        Ok(())
    }
}

/// Serialize and seal a header for `data` under `key`.
///
/// The magic tag follows from the material and whether `data` carries a
/// signature.
pub fn build_header(
    material: &KeyMaterial,
    data: &HeaderData,
    key: &StreamKey,
) -> SealResult<Vec<u8>> {
    if data.extension.len() > MAX_EXTENSION_LEN {
        return Err(SealError::InvalidInput(format!(
            "extension is {} bytes (max {MAX_EXTENSION_LEN})",
            data.extension.len()
        )));
    }
    let magic = material.magic(data.signature.is_some())?;

    let payload = data.to_json()?;
    let sealed = aead::seal(key.as_bytes(), magic.as_bytes(), &payload)
        .map_err(|e| SealError::EncryptionFailed(format!("sealing header: {e}")))?;

    let mut out = Vec::with_capacity(FIXED_LEN + 2 + 128 + sealed.len());
    out.extend_from_slice(magic.as_bytes());
    out.extend_from_slice(&[0, 0]);
    material.encode_into(&mut out)?;
    out.extend_from_slice(&sealed);

    let total = u16::try_from(out.len()).map_err(|_| {
        SealError::EncryptionFailed(format!("header of {} bytes exceeds u16", out.len()))
    })?;
    out[MAGIC_LEN..FIXED_LEN].copy_from_slice(&total.to_le_bytes());

    debug!(magic = %magic, header_len = out.len(), chunks = data.chunk_count, "header built");
    Ok(out)
}

/// Read the magic tag and declared total header length from the first
/// `FIXED_LEN` bytes.
pub fn peek_header_len(bytes: &[u8]) -> SealResult<(Magic, usize)> {
    if bytes.len() < FIXED_LEN {
        return Err(SealError::InvalidFormat(format!("header too short: {} bytes", bytes.len())));
    }
    let magic = Magic::from_prefix(bytes)
        .ok_or_else(|| SealError::InvalidFormat("unrecognized magic tag".into()))?;
    let total = u16::from_le_bytes([bytes[MAGIC_LEN], bytes[MAGIC_LEN + 1]]) as usize;

    let prefix_min = match magic {
        Magic::Password => SALT_SIZE,
        Magic::PublicKey | Magic::Signed => 2,
    };
    if total < FIXED_LEN + prefix_min + aead::overhead() {
        return Err(SealError::InvalidFormat(format!(
            "declared header length {total} is too small for {magic}"
        )));
    }
    Ok((magic, total))
}

/// Header fields readable without any secret.
#[derive(Debug, Clone)]
pub struct HeaderEnvelope {
    pub magic: Magic,
    /// Total header length; chunk records start at this offset
    pub header_len: usize,
    pub material: KeyMaterial,
    sealed: Vec<u8>,
}

/// Split a header into its clear fields and sealed payload.
///
/// Every byte up to the declared length must be accounted for by the mode
/// prefix and the sealed payload.
pub fn parse_envelope(bytes: &[u8]) -> SealResult<HeaderEnvelope> {
    let (magic, header_len) = peek_header_len(bytes)?;
    let body = bytes.get(FIXED_LEN..header_len).ok_or_else(|| {
        SealError::InvalidFormat(format!(
            "truncated header: declares {header_len} bytes, {} available",
            bytes.len()
        ))
    })?;

    let (material, rest) = match magic {
        Magic::Password => {
            let (salt, rest) = body.split_at(SALT_SIZE);
            let mut buf = [0u8; SALT_SIZE];
            buf.copy_from_slice(salt);
            (KeyMaterial::Password { salt: buf }, rest)
        }
        Magic::PublicKey | Magic::Signed => {
            let wrapped_len = u16::from_le_bytes([body[0], body[1]]) as usize;
            let end = 2 + wrapped_len;
            if end + aead::overhead() > body.len() {
                return Err(SealError::InvalidFormat(format!(
                    "wrapped key length {wrapped_len} overruns header of {header_len} bytes"
                )));
            }
            (
                KeyMaterial::Wrapped {
                    wrapped_key: body[2..end].to_vec(),
                },
                &body[end..],
            )
        }
    };

    Ok(HeaderEnvelope {
        magic,
        header_len,
        material,
        sealed: rest.to_vec(),
    })
}

/// Recover the stream key from the envelope's key material.
///
/// Password mode runs Argon2id inline; call it off the async executor.
pub fn recover_key(
    envelope: &HeaderEnvelope,
    password: Option<&SecretString>,
    private_key: Option<&SecretKey>,
) -> SealResult<StreamKey> {
    match &envelope.material {
        KeyMaterial::Password { salt } => {
            let password = password.ok_or(SealError::PasswordRequired)?;
            derive_stream_key(password, salt, &KdfParams::PROTOCOL)
        }
        KeyMaterial::Wrapped { wrapped_key } => {
            let private_key = private_key.ok_or(SealError::PrivateKeyRequired)?;
            unwrap_key(private_key, wrapped_key).map_err(|e| match e {
                SealError::DecryptionFailed(msg) => {
                    SealError::DecryptionFailed(format!("header parse failed: {msg}"))
                }
                other => other,
            })
        }
    }
}

impl HeaderEnvelope {
    /// Decrypt and decode the sealed metadata.
    pub fn open(&self, key: &StreamKey) -> SealResult<HeaderData> {
        let payload = aead::open(key.as_bytes(), self.magic.as_bytes(), &self.sealed).map_err(|_| {
            SealError::DecryptionFailed(
                "header parse failed: wrong password or private key, or corrupted header".into(),
            )
        })?;
        let data = HeaderData::from_json(&payload)?;

        if data.signature.is_some() != (self.magic == Magic::Signed) {
            return Err(SealError::InvalidFormat(format!(
                "{} header {} a signature",
                self.magic,
                if data.signature.is_some() {
                    "unexpectedly carries"
                } else {
                    "is missing"
                }
            )));
        }
        if data.extension.len() > MAX_EXTENSION_LEN {
            return Err(SealError::InvalidFormat(format!(
                "header extension is {} bytes (max {MAX_EXTENSION_LEN})",
                data.extension.len()
            )));
        }

        debug!(
            magic = %self.magic,
            header_len = self.header_len,
            chunks = data.chunk_count,
            "header parsed"
        );
        Ok(data)
    }
}

/// A fully decoded header with its recovered stream key.
#[derive(Debug)]
pub struct ParsedHeader {
    pub magic: Magic,
    pub data: HeaderData,
    /// Byte offset where chunk records begin
    pub header_len: usize,
    pub key: StreamKey,
}

/// Parse, unlock and decode a header in one call.
pub fn parse_header(
    bytes: &[u8],
    password: Option<&SecretString>,
    private_key: Option<&SecretKey>,
) -> SealResult<ParsedHeader> {
    let envelope = parse_envelope(bytes)?;
    let key = recover_key(&envelope, password, private_key)?;
    let data = envelope.open(&key)?;
    Ok(ParsedHeader {
        magic: envelope.magic,
        data,
        header_len: envelope.header_len,
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_crypto::{generate_salt, generate_stream_key, wrap_key, KeyPair, WRAPPED_KEY_SIZE};

    fn sample(signature: Option<[u8; SIGNATURE_SIZE]>) -> HeaderData {
        HeaderData {
            extension: "pdf".into(),
            chunk_count: 25,
            signature,
        }
    }

    fn wrapped_header(recipient: &KeyPair, data: &HeaderData) -> (Vec<u8>, StreamKey) {
        let key = generate_stream_key();
        let wrapped_key = wrap_key(recipient.public(), &key).unwrap();
        let header = build_header(&KeyMaterial::Wrapped { wrapped_key }, data, &key).unwrap();
        (header, key)
    }

    #[test]
    fn test_public_key_header_roundtrip() {
        let recipient = KeyPair::generate();
        let (header, key) = wrapped_header(&recipient, &sample(None));

        assert_eq!(&header[..3], b"PUB");
        let declared = u16::from_le_bytes([header[3], header[4]]) as usize;
        assert_eq!(declared, header.len());

        let parsed = parse_header(&header, None, Some(recipient.secret())).unwrap();
        assert_eq!(parsed.magic, Magic::PublicKey);
        assert_eq!(parsed.data, sample(None));
        assert_eq!(parsed.header_len, header.len());
        assert_eq!(parsed.key.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_signed_header_carries_signature() {
        let recipient = KeyPair::generate();
        let data = sample(Some([9u8; SIGNATURE_SIZE]));
        let (header, _) = wrapped_header(&recipient, &data);

        assert_eq!(&header[..3], b"SIG");
        let parsed = parse_header(&header, None, Some(recipient.secret())).unwrap();
        assert_eq!(parsed.data.signature, Some([9u8; SIGNATURE_SIZE]));
    }

    #[test]
    fn test_password_header_roundtrip() {
        let password = SecretString::from("correct horse");
        let salt = generate_salt();
        let key = derive_stream_key(&password, &salt, &KdfParams::PROTOCOL).unwrap();
        let header = build_header(&KeyMaterial::Password { salt }, &sample(None), &key).unwrap();

        assert_eq!(&header[..3], b"PWD");
        assert_eq!(&header[FIXED_LEN..FIXED_LEN + SALT_SIZE], &salt);

        let parsed = parse_header(&header, Some(&password), None).unwrap();
        assert_eq!(parsed.magic, Magic::Password);
        assert_eq!(parsed.data.chunk_count, 25);
    }

    #[test]
    fn test_password_mode_rejects_signature() {
        let key = generate_stream_key();
        let material = KeyMaterial::Password {
            salt: [0u8; SALT_SIZE],
        };
        let err = build_header(&material, &sample(Some([1u8; 64])), &key).unwrap_err();
        assert!(matches!(err, SealError::InvalidInput(_)));
    }

    #[test]
    fn test_missing_secrets() {
        let recipient = KeyPair::generate();
        let (header, _) = wrapped_header(&recipient, &sample(None));
        assert!(matches!(
            parse_header(&header, Some(&SecretString::from("pw")), None),
            Err(SealError::PrivateKeyRequired)
        ));

        let key = generate_stream_key();
        let pwd_header = build_header(
            &KeyMaterial::Password {
                salt: [3u8; SALT_SIZE],
            },
            &sample(None),
            &key,
        )
        .unwrap();
        assert!(matches!(
            parse_header(&pwd_header, None, Some(recipient.secret())),
            Err(SealError::PasswordRequired)
        ));
    }

    #[test]
    fn test_wrong_private_key_is_decryption_failure() {
        let recipient = KeyPair::generate();
        let stranger = KeyPair::generate();
        let (header, _) = wrapped_header(&recipient, &sample(None));

        match parse_header(&header, None, Some(stranger.secret())) {
            Err(SealError::DecryptionFailed(msg)) => {
                assert!(msg.starts_with("header parse failed:"), "{msg}")
            }
            other => panic!("expected DecryptionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_key_on_payload_names_header() {
        let recipient = KeyPair::generate();
        let (header, _) = wrapped_header(&recipient, &sample(None));
        let envelope = parse_envelope(&header).unwrap();

        match envelope.open(&generate_stream_key()) {
            Err(SealError::DecryptionFailed(msg)) => assert!(msg.contains("header")),
            other => panic!("expected DecryptionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_magic() {
        let err = peek_header_len(b"XYZ\x40\x00").unwrap_err();
        assert!(matches!(err, SealError::InvalidFormat(_)));
        assert!(peek_header_len(b"PW").is_err());
    }

    #[test]
    fn test_declared_length_longer_than_input() {
        let recipient = KeyPair::generate();
        let (header, _) = wrapped_header(&recipient, &sample(None));

        let err = parse_envelope(&header[..header.len() - 1]).unwrap_err();
        assert!(matches!(err, SealError::InvalidFormat(_)));
    }

    #[test]
    fn test_declared_length_shorter_than_content() {
        let recipient = KeyPair::generate();
        let (mut header, _) = wrapped_header(&recipient, &sample(None));
        let shrunk = (header.len() - 1) as u16;
        header[3..5].copy_from_slice(&shrunk.to_le_bytes());

        // The sealed payload loses its last tag byte and no longer opens.
        let err = parse_header(&header, None, Some(recipient.secret())).unwrap_err();
        assert!(err.is_authentication_failure() || matches!(err, SealError::InvalidFormat(_)));
    }

    #[test]
    fn test_wrapped_length_overrun() {
        let recipient = KeyPair::generate();
        let (mut header, _) = wrapped_header(&recipient, &sample(None));
        header[FIXED_LEN..FIXED_LEN + 2].copy_from_slice(&u16::MAX.to_le_bytes());

        let err = parse_envelope(&header).unwrap_err();
        assert!(matches!(err, SealError::InvalidFormat(_)));
    }

    #[test]
    fn test_relabelled_magic_fails() {
        let recipient = KeyPair::generate();
        let (mut header, _) = wrapped_header(&recipient, &sample(None));
        header[..3].copy_from_slice(b"SIG");

        let err = parse_header(&header, None, Some(recipient.secret())).unwrap_err();
        assert!(matches!(err, SealError::DecryptionFailed(_)));
    }

    #[test]
    fn test_wrapped_key_layout() {
        let recipient = KeyPair::generate();
        let (header, _) = wrapped_header(&recipient, &sample(None));
        let wrapped_len = u16::from_le_bytes([header[FIXED_LEN], header[FIXED_LEN + 1]]);
        assert_eq!(wrapped_len as usize, WRAPPED_KEY_SIZE);
    }

    #[test]
    fn test_extension_too_long() {
        let key = generate_stream_key();
        let data = HeaderData {
            extension: "x".repeat(MAX_EXTENSION_LEN + 1),
            chunk_count: 0,
            signature: None,
        };
        let material = KeyMaterial::Wrapped {
            wrapped_key: vec![0u8; WRAPPED_KEY_SIZE],
        };
        assert!(matches!(
            build_header(&material, &data, &key),
            Err(SealError::InvalidInput(_))
        ));
    }
}
