// src/error.rs

//! Crate-wide error type
//!
//! Parse, validation and download failures are expected outcomes of a run
//! and are modeled as `Err` values surfaced at the call site, never panics.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// All error conditions the downloader can report
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure with no extra context
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O failure annotated with what was being attempted
    #[error("{0}")]
    IoError(String),

    /// HTTP transfer failed (after retries)
    #[error("download failed: {0}")]
    DownloadError(String),

    /// JSON or archive contents could not be interpreted
    #[error("parse error: {0}")]
    ParseError(String),

    /// Database manifest failed schema validation
    #[error("invalid database: {0}")]
    InvalidDatabase(String),

    /// A downloaded file did not match its declared MD5
    #[error("checksum mismatch: expected {expected}, actual {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// An INI parameter had an unusable value
    #[error("invalid config parameter: {0}")]
    InvalidConfigParameter(String),

    /// A filter expression could not be compiled for a database
    #[error("bad file filter: {0}")]
    BadFileFilter(String),

    /// The persistent store could not be loaded, migrated or saved
    #[error("store error: {0}")]
    StoreError(String),

    /// A zip archive could not be read or extracted
    #[error("unzip error: {0}")]
    UnzipError(String),
}
