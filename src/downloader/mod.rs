// src/downloader/mod.rs

//! Injected file downloader
//!
//! The reconcile engine never talks HTTP directly: it queues
//! `(descriptor, target)` pairs on a [`FileDownloader`] obtained from the
//! factory and inspects the per-file outcome afterwards. Production uses
//! [`HttpFileDownloader`]; tests inject a scripted implementation.

mod http;

pub use http::{HttpDownloaderFactory, HttpFileDownloader};

use crate::config::Config;
use crate::db::FileDescriptor;

/// Behavior switches for one downloader instance
#[derive(Debug, Clone, Copy)]
pub struct DownloaderOptions {
    /// Fetch queued files concurrently
    pub parallel: bool,
    /// Suppress per-file progress output
    pub silent: bool,
    /// Verify declared MD5 and size after each fetch
    pub hash_check: bool,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            silent: false,
            hash_check: true,
        }
    }
}

/// Parallel fetcher for `(url, target, expected hash, expected size)` tuples
pub trait FileDownloader {
    /// Add a file to the batch; nothing is fetched until
    /// [`FileDownloader::download_files`]
    fn queue_file(&mut self, descriptor: FileDescriptor, target_path: &str);

    /// Fetch everything queued; per-file failures are recorded, not raised
    fn download_files(&mut self);

    /// Target paths fetched and verified successfully, in completion order
    fn correctly_downloaded_files(&self) -> &[String];

    /// Target paths that failed after retries
    fn errors(&self) -> &[String];
}

/// Creates downloader instances bound to the current run's config
pub trait FileDownloaderFactory: Send + Sync {
    fn create(&self, config: &Config, options: DownloaderOptions) -> Box<dyn FileDownloader>;
}
