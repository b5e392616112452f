use thiserror::Error;

pub type SealResult<T> = Result<T, SealError>;

/// Every failure an encrypt/decrypt call can report.
///
/// All variants are fatal to the current operation. Low-level cipher and
/// codec errors are mapped into one of these before they leave a crate.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("a password is required to decrypt this data")]
    PasswordRequired,

    #[error("a private key is required to decrypt this data")]
    PrivateKeyRequired,

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("chunk {index} failed its integrity check")]
    ChunkIntegrityFailed { index: u64 },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SealError {
    /// Stable identifier for the error kind, used in worker events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SealError::InvalidFormat(_) => "invalid_format",
            SealError::PasswordRequired => "password_required",
            SealError::PrivateKeyRequired => "private_key_required",
            SealError::DecryptionFailed(_) => "decryption_failed",
            SealError::ChunkIntegrityFailed { .. } => "chunk_integrity_failed",
            SealError::EncryptionFailed(_) => "encryption_failed",
            SealError::InvalidInput(_) => "invalid_input",
            SealError::Config(_) => "config",
            SealError::Cancelled => "cancelled",
            SealError::Io(_) => "io",
        }
    }

    /// True for failures caused by a wrong secret or altered ciphertext.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            SealError::DecryptionFailed(_) | SealError::ChunkIntegrityFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(SealError::PasswordRequired.kind(), "password_required");
        assert_eq!(
            SealError::ChunkIntegrityFailed { index: 3 }.kind(),
            "chunk_integrity_failed"
        );
        assert_eq!(
            SealError::InvalidFormat("bad magic".into()).kind(),
            "invalid_format"
        );
    }

    #[test]
    fn test_display_names_the_chunk() {
        let err = SealError::ChunkIntegrityFailed { index: 7 };
        assert_eq!(err.to_string(), "chunk 7 failed its integrity check");
    }

    #[test]
    fn test_authentication_failures() {
        assert!(SealError::DecryptionFailed("tag".into()).is_authentication_failure());
        assert!(SealError::ChunkIntegrityFailed { index: 0 }.is_authentication_failure());
        assert!(!SealError::PrivateKeyRequired.is_authentication_failure());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: SealError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
