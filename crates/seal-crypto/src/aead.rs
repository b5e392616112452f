//! XChaCha20-Poly1305 with the nonce carried in front of the ciphertext
//!
//! Sealed format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```
//!
//! Shared by chunk records, the encrypted header payload, and key wrapping.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

pub use chacha20poly1305::aead::Error as AeadError;

/// Encrypt `plaintext` under `key`, binding `aad`.
///
/// Returns `[24-byte nonce][ciphertext][16-byte tag]`.
pub fn seal(key: &[u8; KEY_SIZE], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, AeadError> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(
        nonce,
        Payload {
            msg: plaintext,
            aad,
        },
    )?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt the output of [`seal`]. Fails on a short buffer, wrong key,
/// wrong `aad`, or any modified byte.
pub fn open(key: &[u8; KEY_SIZE], aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, AeadError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(AeadError);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher.decrypt(
        nonce,
        Payload {
            msg: ciphertext,
            aad,
        },
    )
}

/// Bytes added by [`seal`] on top of the plaintext length.
pub const fn overhead() -> usize {
    NONCE_SIZE + TAG_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; KEY_SIZE];
        let sealed = seal(&key, b"aad", b"payload").unwrap();
        assert_eq!(sealed.len(), b"payload".len() + overhead());
        assert_eq!(open(&key, b"aad", &sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_open_rejects_wrong_aad() {
        let key = [7u8; KEY_SIZE];
        let sealed = seal(&key, b"PWD", b"payload").unwrap();
        assert!(open(&key, b"SIG", &sealed).is_err());
    }

    #[test]
    fn test_open_rejects_short_input() {
        let key = [7u8; KEY_SIZE];
        assert!(open(&key, b"", &[0u8; NONCE_SIZE + TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = [1u8; KEY_SIZE];
        let a = seal(&key, b"", b"same").unwrap();
        let b = seal(&key, b"", b"same").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }
}
