// src/store/repository.rs

//! Store persistence
//!
//! The store lives as zipped JSON under the downloader config directory on
//! the system base path. Saves go through a sibling temp file and an atomic
//! rename; a save also stamps the last-successful-run marker that decides
//! whether the next run is a full resync.

use super::{LocalStore, StoreMigrator};
use crate::config::Config;
use crate::constants::{DIR_DOWNLOADER_CONFIG, FILE_DOWNLOADER_STORAGE};
use crate::error::Result;
use crate::filesystem::FileSystem;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns the on-disk store file and the per-INI run markers
pub struct LocalRepository {
    file_system: Arc<dyn FileSystem>,
    storage_save_path: String,
    last_successful_run_path: String,
    logfile_path: String,
}

impl LocalRepository {
    pub fn new(config: &Config, file_system: Arc<dyn FileSystem>) -> Self {
        let stem = Path::new(&config.config_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("downloader");

        let storage_save_path = format!("{FILE_DOWNLOADER_STORAGE}.new");
        let last_successful_run_path =
            format!("{DIR_DOWNLOADER_CONFIG}/{stem}.last_successful_run");
        let logfile_path = format!("{DIR_DOWNLOADER_CONFIG}/{stem}.log");

        for path in [
            FILE_DOWNLOADER_STORAGE,
            storage_save_path.as_str(),
            last_successful_run_path.as_str(),
            logfile_path.as_str(),
        ] {
            file_system.add_system_path(path);
        }

        Self {
            file_system,
            storage_save_path,
            last_successful_run_path,
            logfile_path,
        }
    }

    /// Load the persisted store, migrating it forward. A missing or
    /// unreadable store starts over empty rather than aborting the run.
    pub fn load_store(&self, migrator: &StoreMigrator) -> LocalStore {
        if !self.file_system.is_file(FILE_DOWNLOADER_STORAGE) {
            debug!("No store file yet, starting empty");
            return migrator.empty();
        }

        let loaded = self
            .file_system
            .load_dict_from_file(FILE_DOWNLOADER_STORAGE, None)
            .and_then(|value| migrator.migrate(value));

        match loaded {
            Ok(store) => store,
            Err(e) => {
                warn!("Could not load store ({e}); starting empty");
                println!("Corrupted \"{FILE_DOWNLOADER_STORAGE}\", creating a new one.");
                migrator.empty()
            }
        }
    }

    /// Persist the store atomically (write a sibling temp file, rename)
    pub fn save_store(&self, store: &LocalStore) -> Result<()> {
        let value = serde_json::to_value(store)
            .map_err(|e| crate::error::Error::StoreError(format!("could not encode store: {e}")))?;

        self.file_system.make_dirs_parent(FILE_DOWNLOADER_STORAGE)?;
        self.file_system.save_json_on_zip(&value, &self.storage_save_path)?;
        self.file_system
            .move_file(&self.storage_save_path, FILE_DOWNLOADER_STORAGE)
    }

    /// Stamp the marker that lets the next run skip the full resync
    pub fn mark_successful_run(&self) -> Result<()> {
        self.file_system.touch(&self.last_successful_run_path)
    }

    pub fn has_last_successful_run(&self) -> bool {
        self.file_system.is_file(&self.last_successful_run_path)
    }

    pub fn logfile_path(&self) -> &str {
        &self.logfile_path
    }
}
