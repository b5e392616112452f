//! Sender signatures over a whole-input BLAKE3 digest
//!
//! ECDSA/secp256k1 with the 32-byte digest used directly as the prehash.
//! Signatures are compact `r || s` (64 bytes), low-S normalized.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use seal_core::{SealError, SealResult};

use crate::keypair::{PublicKey, SecretKey};
use crate::{DIGEST_SIZE, SIGNATURE_SIZE};

/// Incremental BLAKE3 over an entire input, fed chunk by chunk.
#[derive(Debug, Default, Clone)]
pub struct InputDigest {
    hasher: blake3::Hasher,
}

impl InputDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(&self) -> [u8; DIGEST_SIZE] {
        *self.hasher.finalize().as_bytes()
    }
}

/// One-shot digest of an in-memory input.
pub fn digest_bytes(data: &[u8]) -> [u8; DIGEST_SIZE] {
    *blake3::hash(data).as_bytes()
}

/// Sign a whole-input digest with the sender's private key.
pub fn sign_digest(
    secret: &SecretKey,
    digest: &[u8; DIGEST_SIZE],
) -> SealResult<[u8; SIGNATURE_SIZE]> {
    let signing_key = SigningKey::from_bytes(&secret.to_bytes())
        .map_err(|e| SealError::InvalidInput(format!("sender key unusable for signing: {e}")))?;

    let signature: Signature = signing_key
        .sign_prehash(digest)
        .map_err(|e| SealError::EncryptionFailed(format!("signing failed: {e}")))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    let mut out = [0u8; SIGNATURE_SIZE];
    out.copy_from_slice(&signature.to_bytes());
    Ok(out)
}

/// Check a compact signature. Any malformed input is just `false`.
pub fn verify_digest(public: &PublicKey, digest: &[u8; DIGEST_SIZE], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_affine(*public.as_affine()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify_prehash(digest, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::KeyPair;

    #[test]
    fn test_sign_verify() {
        let sender = KeyPair::generate();
        let digest = digest_bytes(b"whole input");

        let sig = sign_digest(sender.secret(), &digest).unwrap();
        assert_eq!(sig.len(), SIGNATURE_SIZE);
        assert!(verify_digest(sender.public(), &digest, &sig));
    }

    #[test]
    fn test_verify_wrong_sender() {
        let sender = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = digest_bytes(b"whole input");

        let sig = sign_digest(sender.secret(), &digest).unwrap();
        assert!(!verify_digest(other.public(), &digest, &sig));
    }

    #[test]
    fn test_verify_wrong_digest() {
        let sender = KeyPair::generate();
        let sig = sign_digest(sender.secret(), &digest_bytes(b"a")).unwrap();
        assert!(!verify_digest(sender.public(), &digest_bytes(b"b"), &sig));
    }

    #[test]
    fn test_verify_malformed_signature_is_false() {
        let sender = KeyPair::generate();
        let digest = digest_bytes(b"x");
        assert!(!verify_digest(sender.public(), &digest, &[]));
        assert!(!verify_digest(sender.public(), &digest, &[0u8; 64]));
        assert!(!verify_digest(sender.public(), &digest, &[0xFFu8; 65]));
    }

    #[test]
    fn test_incremental_digest_matches_one_shot() {
        let data = vec![0x5Au8; 10_000];
        let mut digest = InputDigest::new();
        for part in data.chunks(333) {
            digest.update(part);
        }
        assert_eq!(digest.finalize(), digest_bytes(&data));
    }
}
