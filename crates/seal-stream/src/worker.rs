//! Background worker and its job/event message protocol
//!
//! One task consumes jobs from a queue, strictly one at a time. For each
//! job the caller receives zero or more progress events and then exactly
//! one terminal event.
//!
//! Inbound job (JSON, camelCase):
//! ```text
//! { mode: "encrypt" | "decrypt", encryptionMode: "password" | "publicKey",
//!   file?, text?, password?, publicKeyBytes?, privateKeyHex?,
//!   senderPrivateKeyHex?, senderPublicKeyBytes?, isTextMode }
//! ```
//!
//! Outbound events:
//! ```text
//! { progress: 0..=100, stage? }                         (repeated)
//! { data: { bytes, base64?, filename, originalExtension?, signatureValid? } }
//! { error, kind }                                        (terminal)
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use seal_core::config::SealConfig;
use seal_core::{EncryptionMode, SealError, SealResult};
use seal_crypto::{public_key_from_bytes, secret_key_from_hex};

use crate::engine::{DecryptParams, ProgressFn, Recipient};
use crate::facade::{
    decrypt_file, decrypt_text, encrypt_file, sealed_text, InputFile, TEXT_FILE_NAME,
};

/// Jobs that may wait behind the running one
const JOB_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobMode {
    Encrypt,
    Decrypt,
}

fn secret_opt<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// One unit of work for the worker
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub mode: JobMode,
    pub encryption_mode: EncryptionMode,
    #[serde(default)]
    pub file: Option<InputFile>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "secret_opt")]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub public_key_bytes: Option<Vec<u8>>,
    #[serde(default, deserialize_with = "secret_opt")]
    pub private_key_hex: Option<SecretString>,
    /// Signs the output (encrypt, public-key mode)
    #[serde(default, deserialize_with = "secret_opt")]
    pub sender_private_key_hex: Option<SecretString>,
    /// Checked against a signed stream (decrypt)
    #[serde(default)]
    pub sender_public_key_bytes: Option<Vec<u8>>,
    #[serde(default)]
    pub is_text_mode: bool,
}

impl Job {
    pub fn new(mode: JobMode, encryption_mode: EncryptionMode) -> Self {
        Self {
            mode,
            encryption_mode,
            file: None,
            text: None,
            password: None,
            public_key_bytes: None,
            private_key_hex: None,
            sender_private_key_hex: None,
            sender_public_key_bytes: None,
            is_text_mode: false,
        }
    }

    pub fn from_json(json: &str) -> SealResult<Self> {
        serde_json::from_str(json).map_err(|e| SealError::InvalidInput(format!("job: {e}")))
    }
}

/// Payload of a successful job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub bytes: Vec<u8>,
    /// Sealed text form (encrypt, text mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WorkerEvent {
    Progress {
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
    Data { data: JobOutput },
    Error { error: String, kind: String },
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Progress { .. })
    }

    pub fn to_json(&self) -> SealResult<String> {
        serde_json::to_string(self).map_err(|e| {
            SealError::EncryptionFailed(format!("internal: serializing event: {e}"))
        })
    }
}

/// Whole-number percentage; an empty stream is complete.
fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}

type Submission = (Job, mpsc::UnboundedSender<WorkerEvent>);

pub struct Worker {
    config: SealConfig,
    jobs: mpsc::Receiver<Submission>,
}

impl Worker {
    /// Start a worker task on the current tokio runtime.
    pub fn spawn(config: SealConfig) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(JOB_QUEUE_DEPTH);
        let worker = Worker { config, jobs: rx };
        let task = tokio::spawn(worker.run());
        WorkerHandle { jobs: tx, task }
    }

    async fn run(self) {
        let Worker { config, mut jobs } = self;
        debug!("worker started");
        while let Some((job, events)) = jobs.recv().await {
            handle(&config, job, &events).await;
        }
        debug!("worker queue closed");
    }
}

async fn handle(config: &SealConfig, job: Job, events: &mpsc::UnboundedSender<WorkerEvent>) {
    let mode = job.mode;
    let text_mode = job.is_text_mode;

    let sink = events.clone();
    let progress: ProgressFn = Box::new(move |done, total, stage| {
        // A dropped receiver just means nobody is listening.
        let _ = sink.send(WorkerEvent::Progress {
            progress: percent(done, total),
            stage: Some(stage.to_string()),
        });
    });

    let outcome = run_job(config, job, &progress)
        .await
        .map_err(|e| reportable(mode, e));
    let terminal = match outcome {
        Ok(data) => {
            info!(?mode, text_mode, filename = %data.filename, "job complete");
            WorkerEvent::Data { data }
        }
        Err(e) => {
            error!(?mode, text_mode, kind = e.kind(), error = %e, "job failed");
            WorkerEvent::Error {
                error: e.to_string(),
                kind: e.kind().to_string(),
            }
        }
    };
    let _ = events.send(terminal);
}

/// Fold failures outside the reportable taxonomy into the kind that
/// describes them from the job's point of view.
fn reportable(mode: JobMode, e: SealError) -> SealError {
    let failed: fn(String) -> SealError = match mode {
        JobMode::Encrypt => SealError::EncryptionFailed,
        JobMode::Decrypt => SealError::DecryptionFailed,
    };
    match e {
        SealError::Io(e) => failed(format!("I/O error: {e}")),
        SealError::Cancelled => failed("operation cancelled".into()),
        SealError::Config(msg) => SealError::InvalidInput(msg),
        other => other,
    }
}

/// Caller side of a running worker
pub struct WorkerHandle {
    jobs: mpsc::Sender<Submission>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Queue a job; its events arrive on the returned receiver.
    pub async fn submit(&self, job: Job) -> SealResult<mpsc::UnboundedReceiver<WorkerEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.jobs
            .send((job, tx))
            .await
            .map_err(|_| SealError::Cancelled)?;
        Ok(rx)
    }

    /// Queue a job given as JSON.
    pub async fn submit_json(
        &self,
        json: &str,
    ) -> SealResult<mpsc::UnboundedReceiver<WorkerEvent>> {
        self.submit(Job::from_json(json)?).await
    }

    /// Abort the worker immediately. A job in flight produces no terminal
    /// event and no output.
    pub fn terminate(self) {
        debug!("worker terminated");
        self.task.abort();
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(self) -> SealResult<()> {
        drop(self.jobs);
        self.task.await.map_err(task_failure)
    }
}

fn task_failure(e: JoinError) -> SealError {
    if e.is_cancelled() {
        SealError::Cancelled
    } else {
        SealError::EncryptionFailed(format!("internal: worker task panicked: {e}"))
    }
}

/// An unusable receiver public key fails the encryption itself.
fn receiver_key_error(e: SealError) -> SealError {
    match e {
        SealError::InvalidInput(msg) => SealError::EncryptionFailed(format!("receiver {msg}")),
        other => other,
    }
}

fn missing(what: &str) -> SealError {
    SealError::InvalidInput(format!("job is missing {what}"))
}

async fn run_job(config: &SealConfig, job: Job, progress: &ProgressFn) -> SealResult<JobOutput> {
    match job.mode {
        JobMode::Encrypt => run_encrypt(config, job, progress).await,
        JobMode::Decrypt => run_decrypt(config, job, progress).await,
    }
}

async fn run_encrypt(
    config: &SealConfig,
    job: Job,
    progress: &ProgressFn,
) -> SealResult<JobOutput> {
    let recipient = match job.encryption_mode {
        EncryptionMode::Password => {
            Recipient::Password(job.password.ok_or_else(|| missing("password"))?)
        }
        EncryptionMode::PublicKey => {
            let bytes = job
                .public_key_bytes
                .as_deref()
                .ok_or_else(|| missing("publicKeyBytes"))?;
            Recipient::PublicKey(public_key_from_bytes(bytes).map_err(receiver_key_error)?)
        }
    };
    let sender = job
        .sender_private_key_hex
        .as_ref()
        .map(|hex| secret_key_from_hex(hex.expose_secret()))
        .transpose()?;

    let input = if job.is_text_mode {
        let text = job.text.ok_or_else(|| missing("text"))?;
        InputFile::from_bytes(TEXT_FILE_NAME, text.into_bytes())
    } else {
        job.file.ok_or_else(|| missing("file"))?
    };

    let sealed = encrypt_file(&input, recipient, sender, config, Some(progress)).await?;
    let base64 = job
        .is_text_mode
        .then(|| sealed_text(sealed.magic, &sealed.bytes));

    Ok(JobOutput {
        bytes: sealed.bytes,
        base64,
        filename: sealed.filename,
        original_extension: Some(sealed.extension),
        signature_valid: None,
    })
}

async fn run_decrypt(
    config: &SealConfig,
    job: Job,
    progress: &ProgressFn,
) -> SealResult<JobOutput> {
    let private_key = job
        .private_key_hex
        .as_ref()
        .map(|hex| secret_key_from_hex(hex.expose_secret()))
        .transpose()?;
    let sender_public_key = job
        .sender_public_key_bytes
        .as_deref()
        .map(public_key_from_bytes)
        .transpose()?;
    let params = DecryptParams {
        password: job.password,
        private_key,
        sender_public_key,
        queue_depth: config.stream.queue_depth,
    };

    if job.is_text_mode {
        let text = job.text.as_deref().ok_or_else(|| missing("text"))?;
        let opened = decrypt_text(text, &params, Some(progress)).await?;
        return Ok(JobOutput {
            bytes: opened.text.into_bytes(),
            base64: None,
            filename: TEXT_FILE_NAME.to_string(),
            original_extension: None,
            signature_valid: opened.signature_valid,
        });
    }

    let input = job.file.ok_or_else(|| missing("file"))?;
    let opened = decrypt_file(&input, &params, config, Some(progress)).await?;
    Ok(JobOutput {
        bytes: opened.content,
        base64: None,
        filename: opened.filename,
        original_extension: Some(opened.extension),
        signature_valid: opened.signature_valid,
    })
}
