//! Error types for the repograph crate.
//!
//! A single unified enumeration is used across git plumbing, parsing,
//! graph projection, and the status sink. It integrates with `thiserror`
//! to provide `Display` and `std::error::Error` implementations and error
//! source chaining where applicable.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the ingestion pipeline.
pub enum IngestError {
    /// Path is not a git repository, or the requested ref/branch does not exist.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A `git` subprocess exited non-zero or produced unparseable output.
    #[error("Git operation failed: {0}")]
    Git(String),

    /// I/O error from a reader, writer, or subprocess pipe.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    /// UTF-8 conversion error when decoding subprocess output or blob text.
    #[error("UTF-8 conversion error: {0}")]
    ConversionError(String),

    /// Graph store connection or query failure.
    #[error("Graph store error: {0}")]
    GraphStore(String),

    /// Graph store operation failed after exhausting the retry budget.
    #[error("Graph store error after {attempts} attempts: {source_msg}")]
    GraphStoreRetriesExhausted { attempts: u32, source_msg: String },

    /// Manifest file could not be parsed; never fatal, kept for logging context.
    #[error("Manifest parse error in {path}: {reason}")]
    ManifestParse { path: String, reason: String },

    /// Status sink (HTTP or offline) failed to report a status; never fatal.
    #[error("Status sink error: {0}")]
    StatusSink(String),

    /// Configuration value is missing or malformed.
    #[error("Invalid configuration for {0}")]
    Config(String),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    Other(String),
}

impl IngestError {
    pub fn git(msg: impl Into<String>) -> Self {
        IngestError::Git(msg.into())
    }

    pub fn graph(msg: impl Into<String>) -> Self {
        IngestError::GraphStore(msg.into())
    }
}
