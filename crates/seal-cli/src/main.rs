//! seal: encrypt files and text for a password or a secp256k1 public key
//!
//! Commands:
//!   encrypt <input>        - seal a file (--password | --to <pubkey-hex>)
//!   decrypt <input>        - open a sealed file (--password | --key <privkey-hex>)
//!   encrypt-text <text>    - seal a message, print `MAGIC + base64`
//!   decrypt-text <sealed>  - open a sealed message, print the text
//!   keygen                 - print a fresh secp256k1 keypair
//!   check-key <pubkey-hex> - validate a public key
//!   detect <path>          - classify a file by its magic tag
//!   config show            - display the effective configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use seal_core::config::SealConfig;
use seal_core::{EncryptionMode, Format};
use seal_crypto::{validate_public_key, KeyPair};
use seal_stream::{
    detect_file, detect_text, InputFile, Job, JobMode, JobOutput, Worker, WorkerEvent,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "seal",
    version,
    about = "Streaming hybrid encryption for files and text",
    long_about = "seal: XChaCha20-Poly1305 chunked encryption keyed by Argon2id passwords \
                  or secp256k1 public keys, with optional sender signatures"
)]
struct Cli {
    /// Path to seal.toml configuration file
    #[arg(long, short = 'c', env = "SEAL_CONFIG", default_value = "seal.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to logging.level
    #[arg(long, env = "SEAL_LOG")]
    log: Option<String>,

    /// Log format (json, text); defaults to logging.format
    #[arg(long, env = "SEAL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file
    Encrypt {
        /// File to encrypt
        input: PathBuf,
        /// Output path (default: <input>.<encrypted_suffix> next to the input)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Replace the output if it already exists
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        keys: EncryptKeys,
    },

    /// Decrypt a sealed file
    Decrypt {
        /// Sealed file
        input: PathBuf,
        /// Output path (default: recovered file name next to the input)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Replace the output if it already exists
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        keys: DecryptKeys,
    },

    /// Encrypt a text message and print it as MAGIC + base64
    #[command(name = "encrypt-text")]
    EncryptText {
        text: String,
        #[command(flatten)]
        keys: EncryptKeys,
    },

    /// Decrypt a sealed text message and print it
    #[command(name = "decrypt-text")]
    DecryptText {
        sealed: String,
        #[command(flatten)]
        keys: DecryptKeys,
    },

    /// Generate a secp256k1 keypair
    Keygen,

    /// Check that a hex-encoded public key is a valid secp256k1 point
    #[command(name = "check-key")]
    CheckKey {
        /// SEC1 public key, hex (33 or 65 bytes)
        public_key: String,
    },

    /// Report whether a file is sealed, and with which mode
    Detect { path: PathBuf },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct PasswordArgs {
    /// Password; prompted for when the flag is given without a value
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    password: Option<String>,

    /// Read the password from this environment variable
    #[arg(long, value_name = "VAR", conflicts_with = "password")]
    password_env: Option<String>,
}

#[derive(Args, Debug)]
struct EncryptKeys {
    #[command(flatten)]
    password: PasswordArgs,

    /// Recipient public key (SEC1 hex)
    #[arg(
        long,
        value_name = "PUBKEY_HEX",
        conflicts_with_all = ["password", "password_env"]
    )]
    to: Option<String>,

    /// Sign with this private key (hex); public-key mode only
    #[arg(
        long,
        value_name = "PRIVKEY_HEX",
        env = "SEAL_SIGNING_KEY",
        requires = "to"
    )]
    sign_with: Option<String>,
}

#[derive(Args, Debug)]
struct DecryptKeys {
    #[command(flatten)]
    password: PasswordArgs,

    /// Recipient private key (hex)
    #[arg(long, value_name = "PRIVKEY_HEX", env = "SEAL_PRIVATE_KEY")]
    key: Option<String>,

    /// Verify the sender signature against this public key (SEC1 hex)
    #[arg(long, value_name = "PUBKEY_HEX")]
    from: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SealConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.as_deref().unwrap_or(config.logging.level.as_str());
    let format = match (&cli.log_format, config.logging.format.as_str()) {
        (Some(format), _) => format.clone(),
        (None, "json") => LogFormat::Json,
        (None, _) => LogFormat::Text,
    };
    init_logging(level, &format);
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "seal starting"
    );

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            force,
            keys,
        } => cmd_encrypt(&config, &input, output.as_deref(), force, &keys).await,
        Commands::Decrypt {
            input,
            output,
            force,
            keys,
        } => cmd_decrypt(&config, &input, output.as_deref(), force, &keys).await,
        Commands::EncryptText { text, keys } => cmd_encrypt_text(&config, text, &keys).await,
        Commands::DecryptText { sealed, keys } => cmd_decrypt_text(&config, sealed, &keys).await,
        Commands::Keygen => cmd_keygen(),
        Commands::CheckKey { public_key } => cmd_check_key(&public_key),
        Commands::Detect { path } => cmd_detect(&path).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for sealed text and keys.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Secrets from flags ────────────────────────────────────────────────────────

fn resolve_password(args: &PasswordArgs, confirm: bool) -> Result<Option<SecretString>> {
    if let Some(var) = &args.password_env {
        let value = std::env::var(var)
            .with_context(|| format!("password environment variable {var} is not set"))?;
        return Ok(Some(SecretString::from(value)));
    }
    match args.password.as_deref() {
        None => Ok(None),
        Some("") => prompt_password(confirm).map(Some),
        Some(value) => Ok(Some(SecretString::from(value))),
    }
}

fn prompt_password(confirm: bool) -> Result<SecretString> {
    let first = rpassword::prompt_password("Password: ").context("reading password")?;
    if first.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    if confirm {
        let second = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if first != second {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(first))
}

fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim()).with_context(|| format!("{what} is not valid hex"))
}

fn encrypt_job(keys: &EncryptKeys) -> Result<Job> {
    let job = match &keys.to {
        Some(public_hex) => {
            let mut job = Job::new(JobMode::Encrypt, EncryptionMode::PublicKey);
            job.public_key_bytes = Some(decode_hex("--to", public_hex)?);
            job.sender_private_key_hex = keys.sign_with.as_deref().map(SecretString::from);
            job
        }
        None => {
            let Some(password) = resolve_password(&keys.password, true)? else {
                anyhow::bail!(
                    "no recipient: pass --password, --password-env <VAR> or --to <pubkey-hex>"
                );
            };
            let mut job = Job::new(JobMode::Encrypt, EncryptionMode::Password);
            job.password = Some(password);
            job
        }
    };
    Ok(job)
}

/// The magic tag decides how a stream is opened; `format` only fills in
/// the informational mode field.
fn decrypt_job(keys: &DecryptKeys, format: Format) -> Result<Job> {
    let mode = match format {
        Format::Password => EncryptionMode::Password,
        _ => EncryptionMode::PublicKey,
    };
    let mut job = Job::new(JobMode::Decrypt, mode);
    job.password = resolve_password(&keys.password, false)?;
    job.private_key_hex = keys.key.as_deref().map(SecretString::from);
    job.sender_public_key_bytes = keys
        .from
        .as_deref()
        .map(|hex| decode_hex("--from", hex))
        .transpose()?;
    Ok(job)
}

// ── Worker driving + progress ─────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Submit one job to a fresh worker and follow its events to the terminal one.
async fn run_job(config: &SealConfig, job: Job, pb: ProgressBar) -> Result<JobOutput> {
    let worker = Worker::spawn(config.clone());
    let mut events = worker.submit(job).await.context("submitting job")?;

    let mut outcome = None;
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Progress { progress, stage } => {
                pb.set_position(u64::from(progress));
                if let Some(stage) = stage {
                    pb.set_message(stage);
                }
            }
            WorkerEvent::Data { data } => {
                outcome = Some(Ok(data));
                break;
            }
            WorkerEvent::Error { error, kind } => {
                outcome = Some(Err(anyhow::anyhow!("{error} ({kind})")));
                break;
            }
        }
    }
    pb.finish_and_clear();
    worker.shutdown().await.context("stopping worker")?;

    outcome.unwrap_or_else(|| Err(anyhow::anyhow!("worker stopped without a result")))
}

fn report_signature(valid: Option<bool>) -> Result<()> {
    match valid {
        Some(true) => {
            eprintln!("signature: valid");
            Ok(())
        }
        Some(false) => anyhow::bail!("sender signature did NOT verify"),
        None => Ok(()),
    }
}

// ── Output files ──────────────────────────────────────────────────────────────

/// Write via a temp file in the same directory, then rename into place.
async fn write_atomic(path: &Path, bytes: &[u8], force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        anyhow::bail!(
            "{} already exists (use --force to replace it)",
            path.display()
        );
    }
    let tmp = path.with_extension("seal_tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("writing tmp: {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("renaming to: {}", path.display()));
    }
    Ok(())
}

fn output_path(input: &Path, explicit: Option<&Path>, filename: &str) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => input.parent().unwrap_or(Path::new("")).join(filename),
    }
}

// ── `seal encrypt` / `seal decrypt` ───────────────────────────────────────────

async fn cmd_encrypt(
    config: &SealConfig,
    input: &Path,
    output: Option<&Path>,
    force: bool,
    keys: &EncryptKeys,
) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("not a file: {}", input.display());
    }
    let mut job = encrypt_job(keys)?;
    job.file = Some(InputFile::from_path(input));

    let data = run_job(config, job, make_progress_bar("encrypt")).await?;
    let dest = output_path(input, output, &data.filename);
    write_atomic(&dest, &data.bytes, force).await?;

    println!(
        "{} → {} ({} bytes)",
        input.display(),
        dest.display(),
        data.bytes.len()
    );
    Ok(())
}

async fn cmd_decrypt(
    config: &SealConfig,
    input: &Path,
    output: Option<&Path>,
    force: bool,
    keys: &DecryptKeys,
) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("not a file: {}", input.display());
    }
    let format = detect_file(input).await;
    if format == Format::Unencrypted {
        anyhow::bail!("{} is not a sealed file", input.display());
    }
    let mut job = decrypt_job(keys, format)?;
    job.file = Some(InputFile::from_path(input));

    let data = run_job(config, job, make_progress_bar("decrypt")).await?;
    let dest = output_path(input, output, &data.filename);
    write_atomic(&dest, &data.bytes, force).await?;

    println!(
        "{} → {} ({} bytes)",
        input.display(),
        dest.display(),
        data.bytes.len()
    );
    report_signature(data.signature_valid)
}

// ── `seal encrypt-text` / `seal decrypt-text` ─────────────────────────────────

async fn cmd_encrypt_text(config: &SealConfig, text: String, keys: &EncryptKeys) -> Result<()> {
    let mut job = encrypt_job(keys)?;
    job.is_text_mode = true;
    job.text = Some(text);

    let data = run_job(config, job, ProgressBar::hidden()).await?;
    let sealed = data.base64.context("worker returned no sealed text")?;
    println!("{sealed}");
    Ok(())
}

async fn cmd_decrypt_text(config: &SealConfig, sealed: String, keys: &DecryptKeys) -> Result<()> {
    let format = detect_text(&sealed);
    let mut job = decrypt_job(keys, format)?;
    job.is_text_mode = true;
    job.text = Some(sealed);

    let data = run_job(config, job, ProgressBar::hidden()).await?;
    let text = String::from_utf8(data.bytes).context("decrypted text is not UTF-8")?;
    println!("{text}");
    report_signature(data.signature_valid)
}

// ── `seal keygen` / `seal check-key` / `seal detect` ──────────────────────────

fn cmd_keygen() -> Result<()> {
    let pair = KeyPair::generate();
    println!("public:  {}", hex::encode(pair.public_bytes()));
    println!("private: {}", pair.secret_hex().as_str());
    Ok(())
}

fn cmd_check_key(public_hex: &str) -> Result<()> {
    let bytes = decode_hex("public key", public_hex)?;
    let validity = validate_public_key(&bytes);
    if validity.is_valid {
        println!("valid");
        Ok(())
    } else {
        anyhow::bail!(
            "invalid: {}",
            validity.error.as_deref().unwrap_or("not a secp256k1 point")
        )
    }
}

async fn cmd_detect(path: &Path) -> Result<()> {
    let format = detect_file(path).await;
    println!("{}: {format}", path.display());
    Ok(())
}

// ── `seal config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &SealConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = config.to_toml_string().context("serializing config")?;
    print!("{rendered}");
    Ok(())
}
