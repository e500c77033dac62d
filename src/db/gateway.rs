// src/db/gateway.rs

//! Database manifest gateway
//!
//! Fetches every configured manifest (remote ones in parallel through the
//! injected downloader, local ones straight from disk) and validates them
//! into [`DbEntity`] values. Download and parse failures are reported per
//! database; one bad manifest never stops the rest.

use super::DbEntity;
use crate::config::{Config, Description};
use crate::downloader::{DownloaderOptions, FileDownloaderFactory};
use crate::db::FileDescriptor;
use crate::error::Result;
use crate::filesystem::FileSystem;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

struct FetchedManifest<'a> {
    description: &'a Description,
    /// Local path the manifest can be read from
    path: String,
    /// The path is a reserved temp file that must be unlinked afterwards
    is_temp: bool,
}

/// Fetches and parses all configured database manifests
pub struct DbGateway {
    file_system: Arc<dyn FileSystem>,
    downloader_factory: Arc<dyn FileDownloaderFactory>,
}

impl DbGateway {
    pub fn new(
        file_system: Arc<dyn FileSystem>,
        downloader_factory: Arc<dyn FileDownloaderFactory>,
    ) -> Self {
        Self {
            file_system,
            downloader_factory,
        }
    }

    /// Fetch every configured database. Returns the manifests that loaded
    /// and the `db_url`s that did not, distinguishing nothing further: the
    /// caller only needs to report them.
    pub fn fetch_all(&self, config: &Config) -> (Vec<DbEntity>, Vec<String>) {
        let (manifests, mut failed) = self.gather_manifests(config);

        let mut dbs = Vec::new();
        for manifest in &manifests {
            match self.read_db(manifest) {
                Ok(db) => dbs.push(db),
                Err(e) => {
                    debug!("Manifest {} failed: {}", manifest.description.db_url, e);
                    println!(
                        "Could not load database from \"{}\"",
                        manifest.description.db_url
                    );
                    failed.push(manifest.description.db_url.clone());
                }
            }
        }

        for manifest in &manifests {
            if manifest.is_temp {
                let _ = self.file_system.unlink(&manifest.path);
            }
        }

        (dbs, failed)
    }

    fn gather_manifests<'a>(&self, config: &'a Config) -> (Vec<FetchedManifest<'a>>, Vec<String>) {
        let mut downloader = self.downloader_factory.create(
            config,
            DownloaderOptions {
                parallel: true,
                silent: true,
                hash_check: false,
            },
        );

        let mut manifests = Vec::new();
        let mut failed = Vec::new();

        for description in &config.databases {
            if description.db_url.starts_with("http") {
                debug!("Loading db from url: {}", description.db_url);
                let temp = match self.file_system.temp_file() {
                    Ok(temp) => temp,
                    Err(e) => {
                        debug!("Could not reserve temp file: {}", e);
                        failed.push(description.db_url.clone());
                        continue;
                    }
                };
                downloader.queue_file(
                    FileDescriptor::new(description.db_url.clone(), "ignore", 0),
                    &temp,
                );
                manifests.push(FetchedManifest {
                    description,
                    path: temp,
                    is_temp: true,
                });
            } else {
                let path = if description.db_url.starts_with('/') {
                    description.db_url.clone()
                } else {
                    self.file_system.resolve(&description.db_url)
                };
                debug!("Loading db from local path: {}", path);
                manifests.push(FetchedManifest {
                    description,
                    path,
                    is_temp: false,
                });
            }
        }

        downloader.download_files();

        let downloaded = downloader.correctly_downloaded_files();
        let mut available = Vec::new();
        for manifest in manifests {
            if manifest.is_temp && !downloaded.contains(&manifest.path) {
                println!(
                    "Could not download file from db_url: \"{}\"",
                    manifest.description.db_url
                );
                failed.push(manifest.description.db_url.clone());
                let _ = self.file_system.unlink(&manifest.path);
                continue;
            }
            available.push(manifest);
        }

        (available, failed)
    }

    fn read_db(&self, manifest: &FetchedManifest<'_>) -> Result<DbEntity> {
        let suffix = Path::new(&manifest.description.db_url)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()));

        let value = self
            .file_system
            .load_dict_from_file(&manifest.path, suffix.as_deref())?;

        DbEntity::from_value(value, &manifest.description.section)
    }
}
