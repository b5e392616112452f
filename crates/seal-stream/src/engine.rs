//! Streaming orchestrator: one encrypt or decrypt call from source bytes to
//! an assembled output buffer
//!
//! ```text
//! Idle → HeaderPhase → ChunkLoop → Finalize → Done
//!   (any phase) ──error──▶ Failed, all produced output discarded
//! ```
//!
//! During `ChunkLoop` a reader future fills a bounded channel while the
//! cipher loop drains it, so at most `queue_depth` chunks are buffered
//! ahead of the cipher. The cipher loop yields to the scheduler after every
//! chunk. Chunks are processed strictly in index order.

use std::io::ErrorKind;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use seal_core::config::{StreamConfig, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use seal_core::{ChunkMetadata, Magic, SealError, SealResult};
use seal_crypto::{
    aead, derive_stream_key, generate_salt, generate_stream_key, sign_digest, verify_digest,
    wrap_key, ChunkCipher, ChunkRecord, InputDigest, KdfParams, PublicKey, SecretKey,
};

use crate::header::{self, build_header, HeaderData, KeyMaterial, MAX_EXTENSION_LEN};

/// Progress callback type (chunks_done, chunks_total, stage)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Orchestrator state for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    HeaderPhase,
    ChunkLoop,
    Finalize,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::HeaderPhase => "header",
            Phase::ChunkLoop => "chunks",
            Phase::Finalize => "finalize",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who can open the stream
#[derive(Debug)]
pub enum Recipient {
    Password(SecretString),
    PublicKey(PublicKey),
}

#[derive(Debug)]
pub struct EncryptParams {
    pub recipient: Recipient,
    /// Sender key for signed streams (public-key mode only)
    pub sender: Option<SecretKey>,
    /// Original extension recorded in the header
    pub extension: String,
    pub chunk_size: usize,
    pub queue_depth: usize,
}

impl EncryptParams {
    pub fn new(recipient: Recipient, extension: impl Into<String>) -> Self {
        let defaults = StreamConfig::default();
        Self {
            recipient,
            sender: None,
            extension: extension.into(),
            chunk_size: defaults.chunk_size,
            queue_depth: defaults.queue_depth,
        }
    }

    pub fn signed_by(mut self, sender: SecretKey) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_stream_config(mut self, config: &StreamConfig) -> Self {
        self.chunk_size = config.chunk_size;
        self.queue_depth = config.queue_depth;
        self
    }

    fn validate(&self) -> SealResult<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(SealError::InvalidInput(format!(
                "chunk size {} outside {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        if self.queue_depth == 0 {
            return Err(SealError::InvalidInput("queue depth must be at least 1".into()));
        }
        if self.extension.len() > MAX_EXTENSION_LEN {
            return Err(SealError::InvalidInput(format!(
                "extension is {} bytes (max {MAX_EXTENSION_LEN})",
                self.extension.len()
            )));
        }
        if self.sender.is_some() && matches!(self.recipient, Recipient::Password(_)) {
            return Err(SealError::InvalidInput("sender signatures require public-key mode".into()));
        }
        Ok(())
    }
}

/// Secrets offered for decryption; which one is needed depends on the
/// stream's magic tag.
#[derive(Debug)]
pub struct DecryptParams {
    pub password: Option<SecretString>,
    pub private_key: Option<SecretKey>,
    /// Expected sender, checked against a signed stream's signature
    pub sender_public_key: Option<PublicKey>,
    pub queue_depth: usize,
}

impl Default for DecryptParams {
    fn default() -> Self {
        Self {
            password: None,
            private_key: None,
            sender_public_key: None,
            queue_depth: StreamConfig::default().queue_depth,
        }
    }
}

impl DecryptParams {
    pub fn with_password(password: SecretString) -> Self {
        Self {
            password: Some(password),
            ..Self::default()
        }
    }

    pub fn with_private_key(private_key: SecretKey) -> Self {
        Self {
            private_key: Some(private_key),
            ..Self::default()
        }
    }

    pub fn verify_sender(mut self, sender: PublicKey) -> Self {
        self.sender_public_key = Some(sender);
        self
    }

    pub fn with_stream_config(mut self, config: &StreamConfig) -> Self {
        self.queue_depth = config.queue_depth;
        self
    }
}

/// Assembled result of one call
#[derive(Debug)]
pub struct StreamOutput {
    /// Sealed stream (encrypt) or recovered plaintext (decrypt)
    pub bytes: Vec<u8>,
    pub magic: Magic,
    pub extension: String,
    pub chunk_count: u64,
    /// `Some` only when a signed stream was checked against a sender key
    pub signature_valid: Option<bool>,
}

struct Run {
    op: &'static str,
    phase: Phase,
}

impl Run {
    fn new(op: &'static str) -> Self {
        Self {
            op,
            phase: Phase::Idle,
        }
    }

    fn enter(&mut self, next: Phase) {
        debug!(op = self.op, from = %self.phase, to = %next, "phase");
        self.phase = next;
    }

    fn finish<T>(&mut self, result: SealResult<T>) -> SealResult<T> {
        match result {
            Ok(v) => {
                self.enter(Phase::Done);
                Ok(v)
            }
            Err(e) => {
                debug!(
                    op = self.op,
                    phase = %self.phase,
                    kind = e.kind(),
                    error = %e,
                    "stream failed"
                );
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }
}

fn report(progress: Option<&ProgressFn>, done: u64, total: u64, stage: &str) {
    if let Some(cb) = progress {
        cb(done, total, stage);
    }
}

/// A blocking key task that never finished, reported as `fail`.
fn join_error(e: JoinError, what: &str, fail: fn(String) -> SealError) -> SealError {
    if e.is_cancelled() {
        fail(format!("{what} task was cancelled"))
    } else {
        fail(format!("{what} task failed: {e}"))
    }
}

/// Fill `buf` from `source`; running out of bytes means the stream was cut.
async fn read_part<R: AsyncRead + Unpin>(
    source: &mut R,
    buf: &mut [u8],
    what: &str,
) -> SealResult<()> {
    match source.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(SealError::InvalidFormat(format!(
            "truncated stream: {what} is incomplete"
        ))),
        Err(e) => Err(SealError::DecryptionFailed(format!("reading {what}: {e}"))),
    }
}

/// Encrypt `total_len` bytes from `source`.
///
/// The header is sealed in `Finalize`, once the chunk count and (for
/// signed streams) the whole-input digest are known.
pub async fn encrypt_stream<R>(
    source: R,
    total_len: u64,
    params: &EncryptParams,
    progress: Option<&ProgressFn>,
) -> SealResult<StreamOutput>
where
    R: AsyncRead + Unpin + Send,
{
    let mut run = Run::new("encrypt");
    let result = encrypt_phases(&mut run, source, total_len, params, progress).await;
    run.finish(result)
}

async fn encrypt_phases<R>(
    run: &mut Run,
    mut source: R,
    total_len: u64,
    params: &EncryptParams,
    progress: Option<&ProgressFn>,
) -> SealResult<StreamOutput>
where
    R: AsyncRead + Unpin + Send,
{
    params.validate()?;

    // ── HeaderPhase ──────────────────────────────────────────────────────
    run.enter(Phase::HeaderPhase);
    let chunk_size = params.chunk_size as u64;
    let total_chunks = total_len.div_ceil(chunk_size);
    report(progress, 0, total_chunks, Phase::HeaderPhase.as_str());

    let (key, material) = match &params.recipient {
        Recipient::Password(password) => {
            let salt = generate_salt();
            let password = SecretString::from(password.expose_secret());
            let key = tokio::task::spawn_blocking(move || {
                derive_stream_key(&password, &salt, &KdfParams::PROTOCOL)
            })
            .await
            .map_err(|e| join_error(e, "key derivation", SealError::EncryptionFailed))??;
            (key, KeyMaterial::Password { salt })
        }
        Recipient::PublicKey(recipient) => {
            let key = generate_stream_key();
            let wrapped_key = wrap_key(recipient, &key)?;
            (key, KeyMaterial::Wrapped { wrapped_key })
        }
    };
    let cipher = ChunkCipher::new(key);

    // ── ChunkLoop ────────────────────────────────────────────────────────
    run.enter(Phase::ChunkLoop);
    let overhead = (ChunkMetadata::LEN + aead::overhead()) as u64;
    let body_len = total_len.saturating_add(total_chunks.saturating_mul(overhead));
    let mut body = Vec::with_capacity(usize::try_from(body_len).unwrap_or(0));
    let mut digest = params.sender.as_ref().map(|_| InputDigest::new());

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(params.queue_depth);

    let reader = async move {
        let mut remaining = total_len;
        while remaining > 0 {
            let len = remaining.min(chunk_size) as usize;
            let mut buf = vec![0u8; len];
            source
                .read_exact(&mut buf)
                .await
                .map_err(|e| SealError::EncryptionFailed(format!("reading input: {e}")))?;
            remaining -= len as u64;
            if tx.send(buf).await.is_err() {
                break;
            }
        }
        Ok::<(), SealError>(())
    };

    let cipher_loop = async {
        let mut index = 0u64;
        while let Some(chunk) = rx.recv().await {
            if let Some(digest) = digest.as_mut() {
                digest.update(&chunk);
            }
            let record = cipher.encrypt(index, &chunk)?;
            record.write_to(&mut body);
            index += 1;

            debug!(index, total = total_chunks, size = record.metadata.size, "chunk sealed");
            let stage = format!("chunk {index}/{total_chunks}");
            report(progress, index, total_chunks, &stage);
            tokio::task::yield_now().await;
        }
        Ok::<u64, SealError>(index)
    };

    let ((), written) = tokio::try_join!(reader, cipher_loop)?;
    if written != total_chunks {
        return Err(SealError::EncryptionFailed(format!(
            "produced {written} chunks, expected {total_chunks}"
        )));
    }

    // ── Finalize ─────────────────────────────────────────────────────────
    run.enter(Phase::Finalize);
    let signature = match (&params.sender, digest) {
        (Some(sender), Some(digest)) => Some(sign_digest(sender, &digest.finalize())?),
        _ => None,
    };
    let data = HeaderData {
        extension: params.extension.clone(),
        chunk_count: written,
        signature,
    };
    let magic = material.magic(signature.is_some())?;
    let header = build_header(&material, &data, cipher.key())?;

    let mut bytes = Vec::with_capacity(header.len() + body.len());
    bytes.extend_from_slice(&header);
    bytes.append(&mut body);

    report(progress, written, total_chunks, Phase::Finalize.as_str());
    info!(
        mode = %magic,
        chunks = written,
        bytes = total_len,
        sealed_bytes = bytes.len(),
        "encrypted"
    );

    Ok(StreamOutput {
        bytes,
        magic,
        extension: data.extension,
        chunk_count: written,
        signature_valid: None,
    })
}

/// Decrypt a sealed stream of `total_len` bytes from `source`.
///
/// Every declared chunk must be present and nothing may follow the last
/// one.
pub async fn decrypt_stream<R>(
    source: R,
    total_len: u64,
    params: &DecryptParams,
    progress: Option<&ProgressFn>,
) -> SealResult<StreamOutput>
where
    R: AsyncRead + Unpin + Send,
{
    let mut run = Run::new("decrypt");
    let result = decrypt_phases(&mut run, source, total_len, params, progress).await;
    run.finish(result)
}

async fn decrypt_phases<R>(
    run: &mut Run,
    mut source: R,
    total_len: u64,
    params: &DecryptParams,
    progress: Option<&ProgressFn>,
) -> SealResult<StreamOutput>
where
    R: AsyncRead + Unpin + Send,
{
    if params.queue_depth == 0 {
        return Err(SealError::InvalidInput("queue depth must be at least 1".into()));
    }

    // ── HeaderPhase ──────────────────────────────────────────────────────
    run.enter(Phase::HeaderPhase);
    let mut fixed = [0u8; header::FIXED_LEN];
    read_part(&mut source, &mut fixed, "header").await?;
    let (_, header_len) = header::peek_header_len(&fixed)?;

    let mut header_bytes = vec![0u8; header_len];
    header_bytes[..header::FIXED_LEN].copy_from_slice(&fixed);
    read_part(&mut source, &mut header_bytes[header::FIXED_LEN..], "header").await?;
    let envelope = header::parse_envelope(&header_bytes)?;

    let key = {
        let envelope = envelope.clone();
        let password = params
            .password
            .as_ref()
            .map(|p| SecretString::from(p.expose_secret()));
        let private_key = params.private_key.clone();
        tokio::task::spawn_blocking(move || {
            header::recover_key(&envelope, password.as_ref(), private_key.as_ref())
        })
        .await
        .map_err(|e| join_error(e, "key recovery", SealError::DecryptionFailed))??
    };
    let data = envelope.open(&key)?;
    let chunk_count = data.chunk_count;

    let remaining = total_len.saturating_sub(header_len as u64);
    let min_record = (ChunkMetadata::LEN + aead::overhead()) as u64;
    if chunk_count
        .checked_mul(min_record)
        .map_or(true, |need| need > remaining)
    {
        return Err(SealError::InvalidFormat(format!(
            "header declares {chunk_count} chunks but only {remaining} bytes follow"
        )));
    }
    report(progress, 0, chunk_count, Phase::HeaderPhase.as_str());

    // ── ChunkLoop ────────────────────────────────────────────────────────
    run.enter(Phase::ChunkLoop);
    let cipher = ChunkCipher::new(key);
    let mut plaintext = Vec::with_capacity(usize::try_from(remaining).unwrap_or(0));
    let mut digest = (envelope.magic == Magic::Signed && params.sender_public_key.is_some())
        .then(InputDigest::new);

    let (tx, mut rx) = mpsc::channel::<ChunkRecord>(params.queue_depth);

    let reader = async move {
        for index in 0..chunk_count {
            let what = format!("chunk {index}");
            let mut meta = [0u8; ChunkMetadata::LEN];
            read_part(&mut source, &mut meta, &what).await?;
            let metadata = ChunkMetadata::decode(&meta)
                .ok_or_else(|| SealError::InvalidFormat(format!("{what}: bad metadata")))?;

            let mut ciphertext = vec![0u8; ChunkRecord::checked_len(&metadata)?];
            read_part(&mut source, &mut ciphertext, &what).await?;

            let record = ChunkRecord::from_parts(metadata, ciphertext)?;
            if tx.send(record).await.is_err() {
                return Ok(());
            }
        }
        drop(tx);

        let mut extra = [0u8; 1];
        let trailing = source
            .read(&mut extra)
            .await
            .map_err(|e| SealError::DecryptionFailed(format!("reading trailer: {e}")))?;
        if trailing != 0 {
            return Err(SealError::InvalidFormat("trailing bytes after the last chunk".into()));
        }
        Ok::<(), SealError>(())
    };

    let cipher_loop = async {
        let mut index = 0u64;
        while let Some(record) = rx.recv().await {
            let chunk = cipher.decrypt(index, &record)?;
            if let Some(digest) = digest.as_mut() {
                digest.update(&chunk);
            }
            plaintext.extend_from_slice(&chunk);
            index += 1;

            debug!(index, total = chunk_count, size = chunk.len(), "chunk opened");
            let stage = format!("chunk {index}/{chunk_count}");
            report(progress, index, chunk_count, &stage);
            tokio::task::yield_now().await;
        }
        Ok::<u64, SealError>(index)
    };

    let ((), opened) = tokio::try_join!(reader, cipher_loop)?;
    if opened != chunk_count {
        return Err(SealError::InvalidFormat(format!(
            "stream holds {opened} chunks, header declares {chunk_count}"
        )));
    }

    // ── Finalize ─────────────────────────────────────────────────────────
    run.enter(Phase::Finalize);
    let signature_valid = match (&data.signature, &params.sender_public_key, digest) {
        (Some(signature), Some(sender), Some(digest)) => {
            let valid = verify_digest(sender, &digest.finalize(), signature);
            if !valid {
                warn!("sender signature did not verify");
            }
            Some(valid)
        }
        _ => None,
    };

    report(progress, opened, chunk_count, Phase::Finalize.as_str());
    info!(
        mode = %envelope.magic,
        chunks = opened,
        bytes = plaintext.len(),
        signature_valid = ?signature_valid,
        "decrypted"
    );

    Ok(StreamOutput {
        bytes: plaintext,
        magic: envelope.magic,
        extension: data.extension,
        chunk_count: opened,
        signature_valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_crypto::KeyPair;
    use std::sync::{Arc, Mutex};

    fn to(pair: &KeyPair) -> EncryptParams {
        let mut params = EncryptParams::new(Recipient::PublicKey(*pair.public()), "txt");
        params.chunk_size = MIN_CHUNK_SIZE;
        params
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::HeaderPhase.to_string(), "header");
        assert_eq!(Phase::ChunkLoop.as_str(), "chunks");
        assert_eq!(Phase::Failed.as_str(), "failed");
    }

    #[test]
    fn test_run_records_failure() {
        let mut run = Run::new("test");
        run.enter(Phase::ChunkLoop);
        let result: SealResult<()> = run.finish(Err(SealError::Cancelled));
        assert!(result.is_err());
        assert_eq!(run.phase, Phase::Failed);

        let mut run = Run::new("test");
        run.finish(Ok(())).unwrap();
        assert_eq!(run.phase, Phase::Done);
    }

    #[tokio::test]
    async fn test_rejects_bad_chunk_size() {
        let pair = KeyPair::generate();
        let mut params = to(&pair);
        params.chunk_size = 10;

        let err = encrypt_stream(&b"data"[..], 4, &params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_password_with_sender_rejected() {
        let sender = KeyPair::generate();
        let params = EncryptParams::new(Recipient::Password(SecretString::from("pw")), "txt")
            .signed_by(sender.secret().clone());

        let err = encrypt_stream(&b"data"[..], 4, &params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_input_has_no_chunks() {
        let pair = KeyPair::generate();
        let sealed = encrypt_stream(&b""[..], 0, &to(&pair), None).await.unwrap();
        assert_eq!(sealed.chunk_count, 0);

        let params = DecryptParams::with_private_key(pair.secret().clone());
        let opened = decrypt_stream(&sealed.bytes[..], sealed.bytes.len() as u64, &params, None)
            .await
            .unwrap();
        assert!(opened.bytes.is_empty());
        assert_eq!(opened.extension, "txt");
    }

    #[tokio::test]
    async fn test_queue_depth_one_roundtrip() {
        let pair = KeyPair::generate();
        let mut params = to(&pair);
        params.queue_depth = 1;
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let sealed = encrypt_stream(&data[..], data.len() as u64, &params, None)
            .await
            .unwrap();
        assert_eq!(sealed.chunk_count, 10);

        let params = DecryptParams {
            queue_depth: 1,
            ..DecryptParams::with_private_key(pair.secret().clone())
        };
        let opened = decrypt_stream(&sealed.bytes[..], sealed.bytes.len() as u64, &params, None)
            .await
            .unwrap();
        assert_eq!(opened.bytes, data);
    }

    #[tokio::test]
    async fn test_progress_reports_each_chunk() {
        let pair = KeyPair::generate();
        let data = vec![7u8; 3 * MIN_CHUNK_SIZE + 1];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn = Box::new(move |done, total, stage| {
            sink.lock().unwrap().push((done, total, stage.to_string()));
        });

        encrypt_stream(&data[..], data.len() as u64, &to(&pair), Some(&progress))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let done: Vec<u64> = seen.iter().map(|(d, _, _)| *d).collect();
        assert_eq!(done, vec![0, 1, 2, 3, 4, 4]);
        assert!(seen.iter().all(|(_, total, _)| *total == 4));
        assert_eq!(seen[0].2, "header");
        assert_eq!(seen[2].2, "chunk 2/4");
        assert_eq!(seen[5].2, "finalize");
    }

    #[tokio::test]
    async fn test_short_source_is_encryption_failure() {
        let pair = KeyPair::generate();
        let err = encrypt_stream(&b"abc"[..], 10, &to(&pair), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::EncryptionFailed(_)), "got {err:?}");
    }

    struct FailingSource;

    impl AsyncRead for FailingSource {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("device gone")))
        }
    }

    #[tokio::test]
    async fn test_read_error_mid_decrypt_is_decryption_failure() {
        let pair = KeyPair::generate();
        let params = DecryptParams::with_private_key(pair.secret().clone());
        let err = decrypt_stream(FailingSource, 100, &params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::DecryptionFailed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_read_error_mid_encrypt_is_encryption_failure() {
        let pair = KeyPair::generate();
        let err = encrypt_stream(FailingSource, 100, &to(&pair), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::EncryptionFailed(_)), "got {err:?}");
    }

    #[test]
    fn test_default_queue_depth_follows_config() {
        let pair = KeyPair::generate();
        let defaults = StreamConfig::default();
        let encrypt = EncryptParams::new(Recipient::PublicKey(*pair.public()), "bin");
        assert_eq!(encrypt.queue_depth, defaults.queue_depth);
        assert_eq!(encrypt.chunk_size, defaults.chunk_size);
        assert_eq!(DecryptParams::default().queue_depth, defaults.queue_depth);
    }

    #[tokio::test]
    async fn test_chunk_count_beyond_input_rejected() {
        let pair = KeyPair::generate();
        let data = vec![1u8; 2 * MIN_CHUNK_SIZE];
        let sealed = encrypt_stream(&data[..], data.len() as u64, &to(&pair), None)
            .await
            .unwrap();

        // Keep the header, drop every chunk record.
        let (_, header_len) = header::peek_header_len(&sealed.bytes).unwrap();
        let header_only = &sealed.bytes[..header_len];
        let params = DecryptParams::with_private_key(pair.secret().clone());
        let err = decrypt_stream(header_only, header_only.len() as u64, &params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::InvalidFormat(_)));
    }
}
