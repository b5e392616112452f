//! Format detection by leading magic tag
//!
//! Detection never fails: anything unreadable or unrecognized is
//! `Format::Unencrypted`.

use std::path::Path;

use tokio::io::AsyncReadExt;

use seal_core::types::MAGIC_LEN;
use seal_core::{Format, Magic};

/// Classify a binary blob by its first three bytes.
pub fn detect_bytes(bytes: &[u8]) -> Format {
    Magic::from_prefix(bytes)
        .map(|m| m.format())
        .unwrap_or(Format::Unencrypted)
}

/// Classify sealed text (`magic + base64`) by its leading characters.
pub fn detect_text(text: &str) -> Format {
    detect_bytes(text.trim_start().as_bytes())
}

/// Classify a file by reading at most its first three bytes.
pub async fn detect_file(path: &Path) -> Format {
    let mut prefix = [0u8; MAGIC_LEN];
    let read = async {
        let mut file = tokio::fs::File::open(path).await?;
        file.read_exact(&mut prefix).await?;
        Ok::<_, std::io::Error>(())
    };
    match read.await {
        Ok(()) => detect_bytes(&prefix),
        Err(e) => {
            tracing::debug!(
                path = %path.display(),
                error = %e,
                "detect: unreadable, treating as unencrypted"
            );
            Format::Unencrypted
        }
    }
}
