// src/importer/online.rs

//! Online importer: the reconcile engine
//!
//! Diffs every database against its store slice and the disk, then drives
//! the parallel downloader. Databases are processed in configuration order;
//! a path claimed by an earlier database is ignored in later ones. Orphan
//! deletion runs after every database has been processed so a file dropped
//! by one database but still claimed by another survives.

use super::{ImporterCommand, ImporterCommandPart};
use crate::constants::{is_protected_boot_rom, FILE_MISTER, FILE_MISTER_NEW, FILE_MISTER_OLD};
use crate::db::{FileDescriptor, FolderDescriptor, ZipKind, ZipSummary};
use crate::downloader::{DownloaderOptions, FileDownloaderFactory};
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::filter::FileFilter;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OnlineImporter {
    file_system: Arc<dyn FileSystem>,
    downloader_factory: Arc<dyn FileDownloaderFactory>,
    correctly_installed: Vec<String>,
    failed_files: Vec<String>,
    failed_dbs: Vec<String>,
    needs_reboot: bool,
    unknown_filter_terms: Vec<String>,
    resolved_filter_terms: HashSet<String>,
    new_files_not_overwritten: BTreeMap<String, Vec<String>>,
}

/// Pre-run state of one database slice, kept for the deletion phase
struct DbSnapshot {
    old_files: BTreeMap<String, FileDescriptor>,
    old_folders: BTreeMap<String, FolderDescriptor>,
    /// The database was skipped (bad filter); its slice must stay untouched
    skipped: bool,
}

impl OnlineImporter {
    pub fn new(
        file_system: Arc<dyn FileSystem>,
        downloader_factory: Arc<dyn FileDownloaderFactory>,
    ) -> Self {
        Self {
            file_system,
            downloader_factory,
            correctly_installed: Vec::new(),
            failed_files: Vec::new(),
            failed_dbs: Vec::new(),
            needs_reboot: false,
            unknown_filter_terms: Vec::new(),
            resolved_filter_terms: HashSet::new(),
            new_files_not_overwritten: BTreeMap::new(),
        }
    }

    /// Reconcile every database in the command against its store slice.
    ///
    /// `full_resync` distrusts the store and verifies everything against the
    /// disk; it is set when the previous run did not complete.
    pub fn download_dbs_contents(
        &mut self,
        command: &mut ImporterCommand,
        full_resync: bool,
    ) -> Result<()> {
        let mut claimed: HashMap<String, String> = HashMap::new();
        let mut snapshots: Vec<DbSnapshot> = Vec::new();

        for part in command.parts_mut() {
            let mut snapshot = DbSnapshot {
                old_files: part.store.files.clone(),
                old_folders: part.store.folders.clone(),
                skipped: false,
            };
            match self.process_db(part, full_resync, &mut claimed) {
                Ok(()) => {}
                Err(Error::BadFileFilter(message)) => {
                    println!(
                        "Wrong custom download filter on database {}: {message}",
                        part.db.db_id
                    );
                    self.failed_dbs.push(part.db.db_id.clone());
                    snapshot.skipped = true;
                }
                Err(e) => return Err(e),
            }
            snapshots.push(snapshot);
        }

        self.delete_orphans(command, &snapshots, &claimed)
    }

    pub fn correctly_installed_files(&self) -> &[String] {
        &self.correctly_installed
    }

    pub fn files_that_failed(&self) -> &[String] {
        &self.failed_files
    }

    /// Databases skipped because their filter did not compile
    pub fn dbs_that_failed(&self) -> &[String] {
        &self.failed_dbs
    }

    pub fn needs_reboot(&self) -> bool {
        self.needs_reboot
    }

    /// Filter terms that resolved in no processed database
    pub fn unused_filter_terms(&self) -> Vec<String> {
        self.unknown_filter_terms
            .iter()
            .filter(|term| !self.resolved_filter_terms.contains(*term))
            .cloned()
            .collect()
    }

    /// Per database: files present on disk that overwrite protection refused
    pub fn new_files_not_overwritten(&self) -> &BTreeMap<String, Vec<String>> {
        &self.new_files_not_overwritten
    }

    fn process_db(
        &mut self,
        part: &mut ImporterCommandPart,
        full_resync: bool,
        claimed: &mut HashMap<String, String>,
    ) -> Result<()> {
        let db = &part.db;
        let store = &mut part.store;
        let config = &part.config;
        debug!("Processing db {}", db.db_id);

        let filter = FileFilter::compile(config.filter.as_deref(), db.tag_dictionary.as_ref())?;
        for term in &filter.unknown_terms {
            if !self.unknown_filter_terms.contains(term) {
                self.unknown_filter_terms.push(term.clone());
            }
        }
        self.resolved_filter_terms
            .extend(filter.resolved_terms.iter().cloned());

        let mut working_files = db.files.clone();
        let mut working_folders = db.folders.clone();

        // Zips the database no longer declares are forgotten
        store.zips.retain(|zip_id, _| db.zips.contains_key(zip_id));

        // Zip summaries: unchanged descriptors reuse the store subset, new or
        // changed ones need their summary manifest.
        let mut pending_summaries: Vec<&String> = Vec::new();
        for (zip_id, zip) in &db.zips {
            if store.zips.get(zip_id) == Some(zip) {
                materialize_zip_from_store(
                    store,
                    zip_id,
                    &mut working_files,
                    &mut working_folders,
                );
            } else if let Some(summary) = &zip.internal_summary {
                merge_summary(summary, zip_id, &mut working_files, &mut working_folders);
                store.zips.insert(zip_id.clone(), zip.clone());
            } else {
                pending_summaries.push(zip_id);
            }
        }

        if !pending_summaries.is_empty() {
            let mut downloader = self.downloader_factory.create(
                config,
                DownloaderOptions {
                    parallel: config.parallel_update,
                    silent: true,
                    hash_check: true,
                },
            );

            let mut targets = Vec::new();
            for zip_id in &pending_summaries {
                let zip = &db.zips[*zip_id];
                let guard = self.file_system.unique_temp_filename()?;
                downloader.queue_file(zip.summary_file.clone(), guard.value());
                targets.push(((*zip_id).clone(), guard));
            }
            downloader.download_files();
            let downloaded: HashSet<&str> = downloader
                .correctly_downloaded_files()
                .iter()
                .map(String::as_str)
                .collect();

            for (zip_id, guard) in targets {
                let zip = &db.zips[&zip_id];
                if !downloaded.contains(guard.value()) {
                    warn!("Could not fetch summary for zip {}", zip_id);
                    self.failed_files.push(
                        zip.summary_file
                            .url
                            .clone()
                            .unwrap_or_else(|| zip_id.clone()),
                    );
                    // keep whatever the store already had for this zip
                    materialize_zip_from_store(
                        store,
                        &zip_id,
                        &mut working_files,
                        &mut working_folders,
                    );
                    continue;
                }

                let suffix = summary_suffix(&zip.summary_file);
                let summary: ZipSummary = self
                    .file_system
                    .load_dict_from_file(guard.value(), suffix.as_deref())
                    .and_then(|value| {
                        serde_json::from_value(value).map_err(|e| {
                            Error::ParseError(format!("invalid summary for zip {zip_id}: {e}"))
                        })
                    })?;
                let _ = self.file_system.unlink(guard.value());

                merge_summary(&summary, &zip_id, &mut working_files, &mut working_folders);
                store.zips.insert(zip_id.clone(), zip.clone());
            }
        }

        // Filtering pass: excluded zip entries survive in filtered_zip_data,
        // excluded plain entries are simply not installed.
        let mut filtered_data: BTreeMap<String, ZipSummary> = BTreeMap::new();
        let mut kept_files: BTreeMap<String, FileDescriptor> = BTreeMap::new();
        for (path, descriptor) in working_files {
            if filter.allows(descriptor.tags.as_deref()) {
                kept_files.insert(path, descriptor);
            } else if let Some(zip_id) = descriptor.zip_id.clone() {
                filtered_data
                    .entry(zip_id)
                    .or_default()
                    .files
                    .insert(path, descriptor.into_store_entry());
            }
        }
        let mut kept_folders: BTreeMap<String, FolderDescriptor> = BTreeMap::new();
        for (path, descriptor) in working_folders {
            if filter.allows(descriptor.tags.as_deref()) {
                kept_folders.insert(path, descriptor);
            } else if let Some(zip_id) = descriptor.zip_id.clone() {
                filtered_data
                    .entry(zip_id)
                    .or_default()
                    .folders
                    .insert(path, descriptor.into_store_entry());
            }
        }
        store.filtered_zip_data = filtered_data;

        // Per-file decisions
        let mut final_files: BTreeMap<String, FileDescriptor> = BTreeMap::new();
        let mut to_install: Vec<(String, FileDescriptor)> = Vec::new();
        for (path, descriptor) in &kept_files {
            if let Some(owner) = claimed.get(path) {
                info!(
                    "File {} is already provided by database {}, ignoring the one from {}",
                    path, owner, db.db_id
                );
                continue;
            }
            claimed.insert(path.clone(), db.db_id.clone());

            let already_ok = if full_resync {
                self.disk_matches(path, descriptor)
            } else {
                match store.files.get(path) {
                    Some(stored) if stored.hash == descriptor.hash => {
                        !config.check_manually_deleted_files
                            || self.disk_matches(path, descriptor)
                    }
                    _ => false,
                }
            };
            if already_ok {
                if descriptor.wants_previous_cleanup() {
                    self.file_system.delete_previous(path)?;
                }
                final_files.insert(path.clone(), descriptor.clone().into_store_entry());
                continue;
            }

            if !store.files.contains_key(path) && self.file_system.is_file(path) {
                let protected = descriptor.overwrite == Some(false) || is_protected_boot_rom(path);
                if protected {
                    self.new_files_not_overwritten
                        .entry(db.db_id.clone())
                        .or_default()
                        .push(path.clone());
                    continue;
                }
            }

            to_install.push((path.clone(), descriptor.clone()));
        }

        // Folders are created up front and replace the store set wholesale
        let mut final_folders: BTreeMap<String, FolderDescriptor> = BTreeMap::new();
        for (path, descriptor) in kept_folders {
            self.file_system.make_dirs(&path)?;
            final_folders.insert(path, descriptor.into_store_entry());
        }

        // Split installs between per-file downloads and whole-zip extraction
        let mut individual: Vec<(String, FileDescriptor)> = Vec::new();
        let mut by_zip: BTreeMap<String, Vec<(String, FileDescriptor)>> = BTreeMap::new();
        for (path, descriptor) in to_install {
            let bulk_capable = descriptor
                .zip_id
                .as_ref()
                .and_then(|zip_id| db.zips.get(zip_id))
                .is_some_and(|zip| zip.kind == ZipKind::ExtractAllContents);
            if bulk_capable {
                by_zip
                    .entry(descriptor.zip_id.clone().unwrap_or_default())
                    .or_default()
                    .push((path, descriptor));
            } else {
                individual.push((path, descriptor));
            }
        }

        let mut bulk: Vec<(String, Vec<(String, FileDescriptor)>)> = Vec::new();
        for (zip_id, entries) in by_zip {
            let use_bulk = entries.len() >= config.zip_file_count_threshold
                || entries.iter().any(|(_, d)| d.url.is_none());
            if use_bulk {
                println!("Unpacking {}", db.zips[&zip_id].description);
                bulk.push((zip_id, entries));
            } else {
                individual.extend(entries);
            }
        }

        let mut downloader = self.downloader_factory.create(
            config,
            DownloaderOptions {
                parallel: config.parallel_update,
                silent: false,
                hash_check: true,
            },
        );

        let mut queued: Vec<(String, FileDescriptor, String)> = Vec::new();
        for (path, descriptor) in individual {
            if descriptor.url.is_none() {
                warn!("No source for {}", path);
                self.failed_files.push(path);
                continue;
            }
            let target = if path == FILE_MISTER {
                FILE_MISTER_NEW.to_string()
            } else {
                path.clone()
            };
            downloader.queue_file(descriptor.clone(), &target);
            queued.push((path, descriptor, target));
        }

        let mut bulk_targets = Vec::new();
        for (zip_id, entries) in bulk {
            let guard = self.file_system.unique_temp_filename()?;
            downloader.queue_file(db.zips[&zip_id].contents_file.clone(), guard.value());
            bulk_targets.push((zip_id, entries, guard));
        }

        downloader.download_files();
        let downloaded: HashSet<&str> = downloader
            .correctly_downloaded_files()
            .iter()
            .map(String::as_str)
            .collect();

        for (path, descriptor, target) in queued {
            if !downloaded.contains(target.as_str()) {
                self.failed_files.push(path);
                continue;
            }
            if path == FILE_MISTER {
                self.promote_mister_binary()?;
            }
            self.register_install(path, descriptor, &mut final_files)?;
        }

        for (zip_id, entries, guard) in bulk_targets {
            if !downloaded.contains(guard.value()) {
                for (path, _) in entries {
                    self.failed_files.push(path);
                }
                continue;
            }
            // contents archives carry full install-relative paths
            self.file_system.unzip_contents(guard.value(), ".")?;
            for (path, descriptor) in entries {
                self.register_install(path, descriptor, &mut final_files)?;
            }
            self.discard_filtered_extraction_leftovers(store, &zip_id)?;
        }

        store.files = final_files;
        store.folders = final_folders;
        Ok(())
    }

    /// Whole-zip extraction also unpacks entries the filter excluded; remove
    /// them again so the disk matches the wanted set.
    fn discard_filtered_extraction_leftovers(
        &self,
        store: &crate::store::DbStore,
        zip_id: &str,
    ) -> Result<()> {
        let Some(filtered) = store.filtered_zip_data.get(zip_id) else {
            return Ok(());
        };
        for path in filtered.files.keys() {
            self.file_system.unlink(path)?;
        }
        let mut folders: Vec<&String> = filtered.folders.keys().collect();
        folders.sort_by_key(|path| std::cmp::Reverse(path.matches('/').count()));
        for folder in folders {
            if self.file_system.is_folder(folder) && !self.file_system.folder_has_items(folder) {
                self.file_system.remove_folder(folder)?;
            }
        }
        Ok(())
    }

    fn register_install(
        &mut self,
        path: String,
        descriptor: FileDescriptor,
        final_files: &mut BTreeMap<String, FileDescriptor>,
    ) -> Result<()> {
        if descriptor.reboot == Some(true) {
            self.needs_reboot = true;
        }
        if descriptor.wants_previous_cleanup() {
            self.file_system.delete_previous(&path)?;
        }
        final_files.insert(path.clone(), descriptor.into_store_entry());
        self.correctly_installed.push(path);
        Ok(())
    }

    /// The running main binary cannot be overwritten in place: park it and
    /// promote the freshly downloaded one.
    fn promote_mister_binary(&mut self) -> Result<()> {
        if self.file_system.is_file(FILE_MISTER) {
            self.file_system.move_file(FILE_MISTER, FILE_MISTER_OLD)?;
        }
        self.file_system.move_file(FILE_MISTER_NEW, FILE_MISTER)?;
        self.needs_reboot = true;
        Ok(())
    }

    fn disk_matches(&self, path: &str, descriptor: &FileDescriptor) -> bool {
        if !self.file_system.is_file(path) {
            return false;
        }
        if descriptor.hash_is_ignored() {
            return true;
        }
        self.file_system
            .hash(path)
            .map(|hash| hash == descriptor.hash)
            .unwrap_or(false)
    }

    /// Global deletion phase: files and folders present in the old stores
    /// but no longer claimed by any processed database.
    fn delete_orphans(
        &mut self,
        command: &ImporterCommand,
        snapshots: &[DbSnapshot],
        claimed: &HashMap<String, String>,
    ) -> Result<()> {
        let parts = command.parts();

        let mut live_files: HashSet<&str> = claimed.keys().map(String::as_str).collect();
        let mut live_folders: HashSet<&str> = HashSet::new();
        for (part, snapshot) in parts.iter().zip(snapshots) {
            live_folders.extend(part.store.folders.keys().map(String::as_str));
            if snapshot.skipped {
                live_files.extend(part.store.files.keys().map(String::as_str));
            }
        }

        for (part, snapshot) in parts.iter().zip(snapshots) {
            if snapshot.skipped {
                continue;
            }
            for path in snapshot.old_files.keys() {
                if !part.store.files.contains_key(path) && !live_files.contains(path.as_str()) {
                    self.file_system.unlink(path)?;
                }
            }
        }

        let mut orphan_folders: Vec<&String> = Vec::new();
        for (part, snapshot) in parts.iter().zip(snapshots) {
            if snapshot.skipped {
                continue;
            }
            for folder in snapshot.old_folders.keys() {
                if !live_folders.contains(folder.as_str()) && !orphan_folders.contains(&folder) {
                    orphan_folders.push(folder);
                }
            }
        }
        orphan_folders.sort_by_key(|path| std::cmp::Reverse(path.matches('/').count()));
        for folder in orphan_folders {
            if self.file_system.is_folder(folder) && !self.file_system.folder_has_items(folder) {
                self.file_system.remove_folder(folder)?;
            }
        }

        Ok(())
    }
}

/// Re-add a zip's store-held entries (installed and filtered) to the working
/// set so an unchanged zip needs no summary fetch.
fn materialize_zip_from_store(
    store: &crate::store::DbStore,
    zip_id: &str,
    working_files: &mut BTreeMap<String, FileDescriptor>,
    working_folders: &mut BTreeMap<String, FolderDescriptor>,
) {
    for (path, descriptor) in &store.files {
        if descriptor.zip_id.as_deref() == Some(zip_id) {
            working_files
                .entry(path.clone())
                .or_insert_with(|| descriptor.clone());
        }
    }
    for (path, descriptor) in &store.folders {
        if descriptor.zip_id.as_deref() == Some(zip_id) {
            working_folders
                .entry(path.clone())
                .or_insert_with(|| descriptor.clone());
        }
    }
    if let Some(filtered) = store.filtered_zip_data.get(zip_id) {
        for (path, descriptor) in &filtered.files {
            working_files
                .entry(path.clone())
                .or_insert_with(|| descriptor.clone());
        }
        for (path, descriptor) in &filtered.folders {
            working_folders
                .entry(path.clone())
                .or_insert_with(|| descriptor.clone());
        }
    }
}

/// Merge a fetched summary into the working set, stamping the owning zip id
fn merge_summary(
    summary: &ZipSummary,
    zip_id: &str,
    working_files: &mut BTreeMap<String, FileDescriptor>,
    working_folders: &mut BTreeMap<String, FolderDescriptor>,
) {
    for (path, descriptor) in &summary.files {
        let mut descriptor = descriptor.clone();
        descriptor.zip_id.get_or_insert_with(|| zip_id.to_string());
        working_files.entry(path.clone()).or_insert(descriptor);
    }
    for (path, descriptor) in &summary.folders {
        let mut descriptor = descriptor.clone();
        descriptor.zip_id.get_or_insert_with(|| zip_id.to_string());
        working_folders.entry(path.clone()).or_insert(descriptor);
    }
}

fn summary_suffix(summary_file: &FileDescriptor) -> Option<String> {
    summary_file.url.as_deref().and_then(|url| {
        Path::new(url)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
    })
}
