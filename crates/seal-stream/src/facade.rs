//! File and text entry points over the streaming engine
//!
//! Sealed text is the magic tag in clear followed by base64 of the binary
//! stream, so it survives copy and paste:
//! ```text
//! PWD + base64("PWD" | len | salt | ... | chunk records)
//! ```

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use seal_core::config::SealConfig;
use seal_core::{Magic, SealError, SealResult};
use seal_crypto::SecretKey;

use crate::engine::{
    decrypt_stream, encrypt_stream, DecryptParams, EncryptParams, ProgressFn, StreamOutput,
};

pub use crate::engine::Recipient;

/// Name given to the in-memory file wrapping a text message.
pub const TEXT_FILE_NAME: &str = "message.txt";

/// A file-like byte source: a path on disk or named bytes in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputFile {
    Path { path: PathBuf },
    Memory { name: String, bytes: Vec<u8> },
}

impl InputFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        InputFile::Path { path: path.into() }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        InputFile::Memory {
            name: name.into(),
            bytes,
        }
    }

    /// Base file name, without any directory.
    pub fn name(&self) -> String {
        match self {
            InputFile::Path { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            InputFile::Memory { name, .. } => name.clone(),
        }
    }

    /// Extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(str::to_owned)
    }

    async fn open(&self) -> SealResult<(Box<dyn AsyncRead + Unpin + Send + '_>, u64)> {
        match self {
            InputFile::Path { path } => {
                let unreadable =
                    |e: std::io::Error| SealError::InvalidInput(format!("{}: {e}", path.display()));
                let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
                let len = file.metadata().await.map_err(unreadable)?.len();
                Ok((Box::new(file), len))
            }
            InputFile::Memory { bytes, .. } => Ok((Box::new(&bytes[..]), bytes.len() as u64)),
        }
    }
}

/// Result of sealing a file
#[derive(Debug)]
pub struct EncryptedFile {
    pub bytes: Vec<u8>,
    /// Suggested output name, e.g. `report.pdf.enc`
    pub filename: String,
    /// Extension recorded in the header
    pub extension: String,
    pub chunk_count: u64,
    pub magic: Magic,
}

/// Result of opening a sealed file
#[derive(Debug)]
pub struct DecryptedFile {
    pub content: Vec<u8>,
    /// Suggested output name carrying the recovered extension
    pub filename: String,
    pub extension: String,
    pub signature_valid: Option<bool>,
}

/// Result of opening sealed text
#[derive(Debug)]
pub struct DecryptedText {
    pub text: String,
    pub signature_valid: Option<bool>,
}

/// `report.pdf` → `report.pdf.enc`
pub fn encrypted_name(name: &str, suffix: &str) -> String {
    if name.is_empty() {
        format!("sealed.{suffix}")
    } else {
        format!("{name}.{suffix}")
    }
}

/// `report.pdf.enc` → `report.pdf`; `report.enc` with extension `pdf` →
/// `report.pdf`.
pub fn decrypted_name(name: &str, suffix: &str, extension: &str) -> String {
    let base = match name.strip_suffix(&format!(".{suffix}")) {
        Some(stripped) if !stripped.is_empty() => stripped,
        Some(_) => "decrypted",
        None if name.is_empty() => "decrypted",
        None => name,
    };
    let base_path = Path::new(base);
    if base_path.extension().and_then(|e| e.to_str()) == Some(extension) {
        return base.to_string();
    }
    let stem = base_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "decrypted".into());
    format!("{stem}.{extension}")
}

/// Seal a file for `recipient`, optionally signed by `sender`.
pub async fn encrypt_file(
    input: &InputFile,
    recipient: Recipient,
    sender: Option<SecretKey>,
    config: &SealConfig,
    progress: Option<&ProgressFn>,
) -> SealResult<EncryptedFile> {
    let extension = input
        .extension()
        .unwrap_or_else(|| config.output.default_extension.clone());
    let mut params = EncryptParams::new(recipient, extension).with_stream_config(&config.stream);
    if let Some(sender) = sender {
        params = params.signed_by(sender);
    }

    let (source, len) = input.open().await?;
    let output = encrypt_stream(source, len, &params, progress).await?;

    Ok(EncryptedFile {
        filename: encrypted_name(&input.name(), &config.output.encrypted_suffix),
        bytes: output.bytes,
        extension: output.extension,
        chunk_count: output.chunk_count,
        magic: output.magic,
    })
}

/// Open a sealed file with whichever secret `params` carries.
pub async fn decrypt_file(
    input: &InputFile,
    params: &DecryptParams,
    config: &SealConfig,
    progress: Option<&ProgressFn>,
) -> SealResult<DecryptedFile> {
    let (source, len) = input.open().await?;
    let output = decrypt_stream(source, len, params, progress).await?;

    Ok(DecryptedFile {
        filename: decrypted_name(
            &input.name(),
            &config.output.encrypted_suffix,
            &output.extension,
        ),
        content: output.bytes,
        extension: output.extension,
        signature_valid: output.signature_valid,
    })
}

/// Text form of a sealed stream: the magic tag, then base64 of `bytes`.
pub fn sealed_text(magic: Magic, bytes: &[u8]) -> String {
    format!("{magic}{}", BASE64.encode(bytes))
}

/// Seal a text message into `magic + base64(stream)`.
pub async fn encrypt_text(
    text: &str,
    recipient: Recipient,
    sender: Option<SecretKey>,
    config: &SealConfig,
    progress: Option<&ProgressFn>,
) -> SealResult<String> {
    let input = InputFile::from_bytes(TEXT_FILE_NAME, text.as_bytes().to_vec());
    let sealed = encrypt_file(&input, recipient, sender, config, progress).await?;
    Ok(sealed_text(sealed.magic, &sealed.bytes))
}

/// Open sealed text. A leading magic tag is stripped before base64
/// decoding and must agree with the decoded stream.
pub async fn decrypt_text(
    text: &str,
    params: &DecryptParams,
    progress: Option<&ProgressFn>,
) -> SealResult<DecryptedText> {
    let trimmed = text.trim();
    let prefix = Magic::from_prefix(trimmed.as_bytes());
    let encoded = match prefix {
        Some(magic) => &trimmed[magic.as_bytes().len()..],
        None => trimmed,
    };

    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| SealError::InvalidFormat(format!("sealed text is not valid base64: {e}")))?;
    if let Some(magic) = prefix {
        if Magic::from_prefix(&bytes) != Some(magic) {
            return Err(SealError::InvalidFormat(format!(
                "text prefix {magic} does not match the sealed stream"
            )));
        }
    }

    let StreamOutput {
        bytes: plaintext,
        signature_valid,
        ..
    } = decrypt_stream(&bytes[..], bytes.len() as u64, params, progress).await?;

    let text = String::from_utf8(plaintext)
        .map_err(|_| SealError::InvalidFormat("decrypted text is not valid UTF-8".into()))?;
    Ok(DecryptedText {
        text,
        signature_valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_crypto::KeyPair;

    #[test]
    fn test_input_name_and_extension() {
        let file = InputFile::from_path("/tmp/dir/report.final.pdf");
        assert_eq!(file.name(), "report.final.pdf");
        assert_eq!(file.extension().as_deref(), Some("pdf"));

        let bare = InputFile::from_bytes("Makefile", vec![]);
        assert_eq!(bare.extension(), None);

        let dotfile = InputFile::from_bytes(".bashrc", vec![]);
        assert_eq!(dotfile.extension(), None);
    }

    #[test]
    fn test_output_names() {
        assert_eq!(encrypted_name("report.pdf", "enc"), "report.pdf.enc");
        assert_eq!(encrypted_name("", "enc"), "sealed.enc");

        assert_eq!(decrypted_name("report.pdf.enc", "enc", "pdf"), "report.pdf");
        assert_eq!(decrypted_name("report.enc", "enc", "pdf"), "report.pdf");
        assert_eq!(decrypted_name("blob", "enc", "bin"), "blob.bin");
        assert_eq!(decrypted_name(".enc", "enc", "txt"), "decrypted.txt");
    }

    #[test]
    fn test_input_file_json_shapes() {
        let path: InputFile = serde_json::from_str(r#"{"path":"/data/a.txt"}"#).unwrap();
        assert_eq!(path, InputFile::from_path("/data/a.txt"));

        let mem: InputFile = serde_json::from_str(r#"{"name":"a.txt","bytes":[104,105]}"#).unwrap();
        assert_eq!(mem, InputFile::from_bytes("a.txt", b"hi".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_input_path_is_invalid_input() {
        let pair = KeyPair::generate();
        let err = encrypt_file(
            &InputFile::from_path("/nonexistent/seal/input.bin"),
            Recipient::PublicKey(*pair.public()),
            None,
            &SealConfig::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SealError::InvalidInput(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_text_roundtrip_public_key() {
        let pair = KeyPair::generate();
        let config = SealConfig::default();

        let sealed = encrypt_text(
            "meet at noon",
            Recipient::PublicKey(*pair.public()),
            None,
            &config,
            None,
        )
        .await
        .unwrap();
        assert!(sealed.starts_with("PUB"));

        let params = DecryptParams::with_private_key(pair.secret().clone());
        let opened = decrypt_text(&format!("  {sealed}\n"), &params, None)
            .await
            .unwrap();
        assert_eq!(opened.text, "meet at noon");
        assert_eq!(opened.signature_valid, None);
    }

    #[tokio::test]
    async fn test_text_without_prefix_still_decodes() {
        let pair = KeyPair::generate();
        let sealed = encrypt_text(
            "hi",
            Recipient::PublicKey(*pair.public()),
            None,
            &SealConfig::default(),
            None,
        )
        .await
        .unwrap();

        let params = DecryptParams::with_private_key(pair.secret().clone());
        let opened = decrypt_text(&sealed[3..], &params, None).await.unwrap();
        assert_eq!(opened.text, "hi");
    }

    #[tokio::test]
    async fn test_text_prefix_mismatch() {
        let pair = KeyPair::generate();
        let sealed = encrypt_text(
            "hi",
            Recipient::PublicKey(*pair.public()),
            None,
            &SealConfig::default(),
            None,
        )
        .await
        .unwrap();
        let relabelled = format!("SIG{}", &sealed[3..]);

        let params = DecryptParams::with_private_key(pair.secret().clone());
        let err = decrypt_text(&relabelled, &params, None).await.unwrap_err();
        assert!(matches!(err, SealError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_text_bad_base64() {
        let err = decrypt_text("PWD***", &DecryptParams::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_file_on_disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, b"# notes\n").unwrap();
        let pair = KeyPair::generate();
        let config = SealConfig::default();

        let sealed = encrypt_file(
            &InputFile::from_path(&path),
            Recipient::PublicKey(*pair.public()),
            None,
            &config,
            None,
        )
        .await
        .unwrap();
        assert_eq!(sealed.filename, "notes.md.enc");
        assert_eq!(sealed.extension, "md");

        let sealed_path = dir.path().join(&sealed.filename);
        std::fs::write(&sealed_path, &sealed.bytes).unwrap();

        let params = DecryptParams::with_private_key(pair.secret().clone());
        let opened = decrypt_file(&InputFile::from_path(&sealed_path), &params, &config, None)
            .await
            .unwrap();
        assert_eq!(opened.content, b"# notes\n");
        assert_eq!(opened.filename, "notes.md");
    }

    #[tokio::test]
    async fn test_missing_extension_uses_default() {
        let pair = KeyPair::generate();
        let sealed = encrypt_file(
            &InputFile::from_bytes("LICENSE", b"MIT".to_vec()),
            Recipient::PublicKey(*pair.public()),
            None,
            &SealConfig::default(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(sealed.extension, "bin");
    }
}
