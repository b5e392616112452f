//! seal-stream: the sealed stream format and the machinery that drives it
//!
//! - `header`: magic tag, length-prefixed key material, encrypted metadata
//! - `detect`: classify bytes, text, or files by their leading magic tag
//! - `engine`: async chunk loop with bounded backpressure and progress
//! - `facade`: file and copy-pasteable text entry points
//! - `worker`: background job queue speaking the JSON message protocol

pub mod detect;
pub mod engine;
pub mod facade;
pub mod header;
pub mod worker;

pub use detect::{detect_bytes, detect_file, detect_text};
pub use engine::{
    decrypt_stream, encrypt_stream, DecryptParams, EncryptParams, Phase, ProgressFn, Recipient,
    StreamOutput,
};
pub use facade::{
    decrypt_file, decrypt_text, encrypt_file, encrypt_text, DecryptedFile, DecryptedText,
    EncryptedFile, InputFile,
};
pub use header::{build_header, parse_header, HeaderData, KeyMaterial, ParsedHeader};
pub use worker::{Job, JobMode, JobOutput, Worker, WorkerEvent, WorkerHandle};
