// src/importer/offline.rs

//! Offline importer
//!
//! Ingests pre-seed database files shipped on the SD card (e.g. by the SD
//! installer) into the store without downloading the content they describe.
//! Only entries that already exist on disk with the declared hash are
//! adopted; the pre-seed file's own MD5 acts as the idempotence guard.

use super::ImporterCommand;
use crate::config::{AllowDelete, Config};
use crate::db::{DbEntity, ZipSummary};
use crate::downloader::{DownloaderOptions, FileDownloaderFactory};
use crate::error::Result;
use crate::filesystem::FileSystem;
use crate::store::DbStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct OfflineImporter {
    file_system: Arc<dyn FileSystem>,
    downloader_factory: Arc<dyn FileDownloaderFactory>,
}

impl OfflineImporter {
    pub fn new(
        file_system: Arc<dyn FileSystem>,
        downloader_factory: Arc<dyn FileDownloaderFactory>,
    ) -> Self {
        Self {
            file_system,
            downloader_factory,
        }
    }

    /// Apply every pre-seed file named by every database in the command
    pub fn apply_offline_databases(&self, command: &mut ImporterCommand) -> Result<()> {
        for part in command.parts_mut() {
            for db_file in part.db.db_files.clone() {
                self.update_store_from_offline_db(
                    &part.db.db_id,
                    &db_file,
                    &mut part.store,
                    &part.config,
                )?;
            }
        }
        Ok(())
    }

    fn update_store_from_offline_db(
        &self,
        store_id: &str,
        db_file: &str,
        store: &mut DbStore,
        config: &Config,
    ) -> Result<()> {
        if !self.file_system.is_file(db_file) {
            return Ok(());
        }

        let db_file_hash = self.file_system.hash(db_file)?;
        if store.offline_databases_imported.contains(&db_file_hash) {
            debug!("Pre-seed {} already ingested", db_file);
            self.remove_db_file(db_file, config);
            return Ok(());
        }

        let db = match self
            .file_system
            .load_dict_from_file(db_file, None)
            .and_then(|value| DbEntity::from_value(value, store_id))
        {
            Ok(db) => db,
            Err(e) => {
                warn!("Offline database {} failed validation: {}", db_file, e);
                println!(
                    "WARNING! Offline database \"{store_id}\" could not be loaded from file {db_file}"
                );
                println!("Ignoring the offline database.");
                return Ok(());
            }
        };

        println!("Importing {db_file} into the local store.");

        self.import_folders(&db.folders, store)?;
        self.import_files(&db.files, store)?;

        let mut errors = Vec::new();
        if !db.zips.is_empty() {
            errors.extend(self.update_from_zips(&db, store, config)?);
        }

        if errors.is_empty() {
            store.offline_databases_imported.push(db_file_hash);
            self.remove_db_file(db_file, config);
        } else {
            for error in errors {
                println!("Offline importer error: {error}");
            }
        }
        Ok(())
    }

    /// Fetch each zip's summary and adopt its entries like direct ones.
    /// Returns the summary targets that failed to download.
    fn update_from_zips(
        &self,
        db: &DbEntity,
        store: &mut DbStore,
        config: &Config,
    ) -> Result<Vec<String>> {
        let mut downloader = self.downloader_factory.create(
            config,
            DownloaderOptions {
                parallel: config.parallel_update,
                silent: true,
                hash_check: true,
            },
        );

        let mut zip_ids_by_target = std::collections::HashMap::new();
        for (zip_id, zip) in &db.zips {
            let target = format!("/tmp/{zip_id}.json.zip");
            downloader.queue_file(zip.summary_file.clone(), &target);
            zip_ids_by_target.insert(target, zip_id.clone());
        }

        downloader.download_files();

        for target in downloader.correctly_downloaded_files() {
            let Some(zip_id) = zip_ids_by_target.get(target) else {
                continue;
            };
            let summary: ZipSummary = self
                .file_system
                .load_dict_from_file(target, None)
                .and_then(|value| {
                    serde_json::from_value(value).map_err(|e| {
                        crate::error::Error::ParseError(format!(
                            "invalid zip summary for {zip_id}: {e}"
                        ))
                    })
                })?;

            store.zips.insert(zip_id.clone(), db.zips[zip_id].clone());
            self.import_folders(&summary.folders, store)?;
            self.import_files(&summary.files, store)?;
            self.file_system.unlink(target)?;
        }

        Ok(downloader.errors().to_vec())
    }

    fn import_files(
        &self,
        files: &std::collections::BTreeMap<String, crate::db::FileDescriptor>,
        store: &mut DbStore,
    ) -> Result<()> {
        for (path, descriptor) in files {
            if store.files.contains_key(path) || !self.file_system.is_file(path) {
                continue;
            }
            let matches = descriptor.hash_is_ignored()
                || self.file_system.hash(path)? == descriptor.hash;
            if matches {
                store
                    .files
                    .insert(path.clone(), descriptor.clone().into_store_entry());
            }
        }
        Ok(())
    }

    fn import_folders(
        &self,
        folders: &std::collections::BTreeMap<String, crate::db::FolderDescriptor>,
        store: &mut DbStore,
    ) -> Result<()> {
        for (path, descriptor) in folders {
            if !store.folders.contains_key(path) && self.file_system.is_folder(path) {
                store
                    .folders
                    .insert(path.clone(), descriptor.clone().into_store_entry());
            }
        }
        Ok(())
    }

    fn remove_db_file(&self, db_file: &str, config: &Config) {
        if config.allow_delete == AllowDelete::All {
            let _ = self.file_system.unlink(db_file);
        }
    }
}
