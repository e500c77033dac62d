// src/downloader/http.rs

//! HTTP implementation of the file downloader
//!
//! Each file is streamed to a sibling temp path and renamed into place after
//! verification, so an interrupted transfer never leaves a half-written
//! install target. Files above the configured size limit are fetched
//! serially after the parallel batch.

use super::{DownloaderOptions, FileDownloader, FileDownloaderFactory};
use crate::config::Config;
use crate::db::FileDescriptor;
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RETRY_DELAY_MS: u64 = 1000;

struct QueuedFile {
    descriptor: FileDescriptor,
    target: String,
}

/// Production downloader over `reqwest` with retry and MD5/size verification
pub struct HttpFileDownloader {
    file_system: Arc<dyn FileSystem>,
    options: DownloaderOptions,
    process_limit: usize,
    timeout: u64,
    retries: u32,
    size_limit_bytes: u64,
    queued: Vec<QueuedFile>,
    downloaded: Vec<String>,
    errors: Vec<String>,
}

impl HttpFileDownloader {
    pub fn new(file_system: Arc<dyn FileSystem>, config: &Config, options: DownloaderOptions) -> Self {
        Self {
            file_system,
            options,
            process_limit: config.downloader_process_limit.max(1),
            timeout: config.downloader_timeout,
            retries: config.downloader_retries.max(1),
            size_limit_bytes: config.downloader_size_mb_limit * 1024 * 1024,
            queued: Vec::new(),
            downloaded: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn build_client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout))
            .build()
            .map_err(|e| Error::DownloadError(format!("could not create HTTP client: {e}")))
    }

    fn fetch_one(&self, client: &reqwest::blocking::Client, file: &QueuedFile) -> Result<()> {
        let Some(url) = file.descriptor.url.as_deref() else {
            return Err(Error::DownloadError(format!(
                "no url declared for {}",
                file.target
            )));
        };

        let target = self.file_system.download_target_path(&file.target);
        self.file_system.make_dirs_parent(&file.target)?;
        let temp = format!("{target}.tmp");

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_attempt(client, url, &temp, &file.descriptor) {
                Ok(()) => {
                    fs::rename(&temp, &target).map_err(|e| {
                        Error::IoError(format!("could not move {temp} to {target}: {e}"))
                    })?;
                    if !self.options.silent {
                        println!(" {}", file.target);
                    }
                    return Ok(());
                }
                Err(e) => {
                    let _ = fs::remove_file(&temp);
                    if attempt >= self.retries {
                        return Err(e);
                    }
                    warn!("Attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)));
                }
            }
        }
    }

    fn fetch_attempt(
        &self,
        client: &reqwest::blocking::Client,
        url: &str,
        temp: &str,
        descriptor: &FileDescriptor,
    ) -> Result<()> {
        let mut response = client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("could not fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let mut file = File::create(temp)
            .map_err(|e| Error::IoError(format!("could not create {temp}: {e}")))?;
        let written = io::copy(&mut response, &mut file)
            .map_err(|e| Error::IoError(format!("could not write {temp}: {e}")))?;
        drop(file);

        if self.options.hash_check && !descriptor.hash_is_ignored() {
            if descriptor.size > 0 && written != descriptor.size {
                return Err(Error::DownloadError(format!(
                    "size mismatch for {url}: expected {}, got {written}",
                    descriptor.size
                )));
            }
            let actual = self.file_system.hash(temp)?;
            if actual != descriptor.hash {
                return Err(Error::ChecksumMismatch {
                    expected: descriptor.hash.clone(),
                    actual,
                });
            }
        }

        Ok(())
    }
}

impl FileDownloader for HttpFileDownloader {
    fn queue_file(&mut self, descriptor: FileDescriptor, target_path: &str) {
        debug!("Queueing {} -> {}", descriptor.url.as_deref().unwrap_or("?"), target_path);
        self.queued.push(QueuedFile {
            descriptor,
            target: target_path.to_string(),
        });
    }

    fn download_files(&mut self) {
        if self.queued.is_empty() {
            return;
        }

        let client = match self.build_client() {
            Ok(client) => client,
            Err(e) => {
                warn!("{}", e);
                self.errors.extend(self.queued.drain(..).map(|f| f.target));
                return;
            }
        };

        let queued = std::mem::take(&mut self.queued);
        let (oversized, regular): (Vec<_>, Vec<_>) = queued
            .into_iter()
            .partition(|f| self.size_limit_bytes > 0 && f.descriptor.size > self.size_limit_bytes);

        let mut results: Vec<(String, Result<()>)> = Vec::new();

        if self.options.parallel && regular.len() > 1 {
            let workers = self.process_limit.min(regular.len());
            let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build();
            match pool {
                Ok(pool) => {
                    results.extend(pool.install(|| {
                        regular
                            .par_iter()
                            .map(|f| (f.target.clone(), self.fetch_one(&client, f)))
                            .collect::<Vec<_>>()
                    }));
                }
                Err(e) => {
                    warn!("Could not build download pool: {}, falling back to serial", e);
                    results.extend(
                        regular
                            .iter()
                            .map(|f| (f.target.clone(), self.fetch_one(&client, f))),
                    );
                }
            }
        } else {
            results.extend(
                regular
                    .iter()
                    .map(|f| (f.target.clone(), self.fetch_one(&client, f))),
            );
        }

        // oversized files are downloaded one at a time
        results.extend(
            oversized
                .iter()
                .map(|f| (f.target.clone(), self.fetch_one(&client, f))),
        );

        for (target, result) in results {
            match result {
                Ok(()) => self.downloaded.push(target),
                Err(e) => {
                    warn!("Download of {} failed: {}", target, e);
                    self.errors.push(target);
                }
            }
        }
    }

    fn correctly_downloaded_files(&self) -> &[String] {
        &self.downloaded
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Factory wiring the production downloader to the shared filesystem
pub struct HttpDownloaderFactory {
    file_system: Arc<dyn FileSystem>,
}

impl HttpDownloaderFactory {
    pub fn new(file_system: Arc<dyn FileSystem>) -> Self {
        Self { file_system }
    }
}

impl FileDownloaderFactory for HttpDownloaderFactory {
    fn create(&self, config: &Config, options: DownloaderOptions) -> Box<dyn FileDownloader> {
        Box::new(HttpFileDownloader::new(
            Arc::clone(&self.file_system),
            config,
            options,
        ))
    }
}
