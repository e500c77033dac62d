// tests/common/mod.rs

//! Shared test support: an in-memory filesystem, a scripted downloader and
//! builders for databases, stores and descriptors.

#![allow(dead_code)]

pub mod objects;
pub mod zip_objects;

use mister_downloader::config::{AllowDelete, Config};
use mister_downloader::db::FileDescriptor;
use mister_downloader::downloader::{DownloaderOptions, FileDownloader, FileDownloaderFactory};
use mister_downloader::filesystem::{FileSystem, ReservedTempName};
use mister_downloader::Result;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One file held by the in-memory filesystem
#[derive(Debug, Clone, Default)]
pub struct FakeFile {
    pub hash: String,
    pub size: u64,
    pub content: Option<String>,
    /// What `load_dict_from_file` returns for this file
    pub json: Option<Value>,
    /// What `unzip_contents` materializes: files plus folder names
    pub zipped_files: Option<(Vec<(String, FakeFile)>, Vec<String>)>,
}

impl FakeFile {
    pub fn with_hash(hash: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            size,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct FsState {
    /// Keyed by lowercased resolved path (the SD card is FAT)
    files: HashMap<String, FakeFile>,
    folders: HashSet<String>,
}

/// In-memory [`FileSystem`] with FAT-style case-insensitive lookups
pub struct InMemoryFileSystem {
    base_path: String,
    base_system_path: String,
    allow_delete: AllowDelete,
    state: Mutex<FsState>,
    system_paths: Mutex<HashSet<String>>,
    temp_reservations: Arc<Mutex<HashSet<String>>>,
    temp_counter: AtomicUsize,
}

impl InMemoryFileSystem {
    pub fn new() -> Arc<Self> {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            base_path: config.base_path.clone(),
            base_system_path: config.base_system_path.clone(),
            allow_delete: config.allow_delete,
            state: Mutex::new(FsState::default()),
            system_paths: Mutex::new(HashSet::new()),
            temp_reservations: Arc::new(Mutex::new(HashSet::new())),
            temp_counter: AtomicUsize::new(0),
        })
    }

    fn key(&self, path: &str) -> String {
        self.resolve(path).to_lowercase()
    }

    fn insert_file(&self, path: &str, file: FakeFile) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(self.key(path), file);
    }

    pub fn with_file(self: &Arc<Self>, path: &str, file: FakeFile) -> Arc<Self> {
        self.insert_file(path, file);
        Arc::clone(self)
    }

    pub fn with_json_file(self: &Arc<Self>, path: &str, hash: &str, json: Value) -> Arc<Self> {
        self.with_file(
            path,
            FakeFile {
                hash: hash.to_string(),
                json: Some(json),
                ..FakeFile::default()
            },
        )
    }

    pub fn with_folders(self: &Arc<Self>, folders: &[&str]) -> Arc<Self> {
        {
            let mut state = self.state.lock().unwrap();
            for folder in folders {
                let key = self.resolve(folder).to_lowercase();
                state.folders.insert(key);
            }
        }
        Arc::clone(self)
    }

    /// Folder names relative to the base path, sorted
    pub fn folder_names(&self) -> Vec<String> {
        let prefix = format!("{}/", self.base_path.to_lowercase());
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .folders
            .iter()
            .map(|folder| folder.strip_prefix(&prefix).unwrap_or(folder).to_string())
            .collect();
        names.sort();
        names
    }

    pub fn file_hash(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&self.key(path))
            .map(|f| f.hash.clone())
    }
}

impl FileSystem for InMemoryFileSystem {
    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }
        let system_paths = self.system_paths.lock().unwrap();
        let base = if system_paths.contains(path) {
            &self.base_system_path
        } else {
            &self.base_path
        };
        format!("{base}/{path}")
    }

    fn add_system_path(&self, path: &str) {
        self.system_paths.lock().unwrap().insert(path.to_string());
    }

    fn is_file(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains_key(&self.key(path))
    }

    fn is_folder(&self, path: &str) -> bool {
        self.state.lock().unwrap().folders.contains(&self.key(path))
    }

    fn read_file_contents(&self, path: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&self.key(path))
            .and_then(|f| f.content.clone())
            .ok_or_else(|| mister_downloader::Error::IoError(format!("no content at {path}")))
    }

    fn write_file_contents(&self, path: &str, content: &str) -> Result<()> {
        let key = self.key(path);
        let mut state = self.state.lock().unwrap();
        let file = state.files.entry(key).or_insert_with(|| FakeFile {
            hash: path.to_string(),
            ..FakeFile::default()
        });
        file.content = Some(content.to_string());
        Ok(())
    }

    fn touch(&self, path: &str) -> Result<()> {
        let key = self.key(path);
        self.state
            .lock()
            .unwrap()
            .files
            .entry(key)
            .or_insert_with(|| FakeFile {
                hash: path.to_string(),
                ..FakeFile::default()
            });
        Ok(())
    }

    fn move_file(&self, source: &str, target: &str) -> Result<()> {
        let source_key = self.key(source);
        let target_key = self.key(target);
        let mut state = self.state.lock().unwrap();
        let file = state.files.remove(&source_key).ok_or_else(|| {
            mister_downloader::Error::IoError(format!("cannot move missing {source}"))
        })?;
        state.files.insert(target_key, file);
        Ok(())
    }

    fn copy_file(&self, source: &str, target: &str) -> Result<()> {
        let source_key = self.key(source);
        let target_key = self.key(target);
        let mut state = self.state.lock().unwrap();
        let file = state.files.get(&source_key).cloned().ok_or_else(|| {
            mister_downloader::Error::IoError(format!("cannot copy missing {source}"))
        })?;
        state.files.insert(target_key, file);
        Ok(())
    }

    fn hash(&self, path: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&self.key(path))
            .map(|f| f.hash.clone())
            .ok_or_else(|| mister_downloader::Error::IoError(format!("no file at {path}")))
    }

    fn make_dirs(&self, path: &str) -> Result<()> {
        let key = self.key(path);
        self.state.lock().unwrap().folders.insert(key);
        Ok(())
    }

    fn make_dirs_parent(&self, path: &str) -> Result<()> {
        if let Some((parent, _)) = path.rsplit_once('/') {
            let key = self.key(parent);
            self.state.lock().unwrap().folders.insert(key);
        }
        Ok(())
    }

    fn folder_has_items(&self, path: &str) -> bool {
        let prefix = format!("{}/", self.key(path));
        let state = self.state.lock().unwrap();
        state.files.keys().any(|file| file.starts_with(&prefix))
            || state.folders.iter().any(|folder| folder.starts_with(&prefix))
    }

    fn remove_folder(&self, path: &str) -> Result<()> {
        if self.allow_delete != AllowDelete::All {
            return Ok(());
        }
        let key = self.key(path);
        self.state.lock().unwrap().folders.remove(&key);
        Ok(())
    }

    fn download_target_path(&self, path: &str) -> String {
        self.resolve(path)
    }

    fn unlink(&self, path: &str) -> Result<bool> {
        let key = self.key(path);
        if self.allow_delete != AllowDelete::All {
            if self.allow_delete == AllowDelete::OldRbf && path.to_lowercase().ends_with(".rbf") {
                return Ok(self.state.lock().unwrap().files.remove(&key).is_some());
            }
            return Ok(true);
        }
        Ok(self.state.lock().unwrap().files.remove(&key).is_some())
    }

    fn delete_previous(&self, path: &str) -> Result<()> {
        if self.allow_delete != AllowDelete::All {
            return Ok(());
        }
        let resolved = self.key(path);
        let Some((parent, name)) = resolved.rsplit_once('/') else {
            return Ok(());
        };
        let dated = dated_sibling_regex();
        let Some(captures) = dated.captures(name) else {
            return Ok(());
        };
        let prefix = format!("{}/{}", parent, &captures[1]);
        let extension = captures[2].to_string();
        let parent = parent.to_string();

        let mut state = self.state.lock().unwrap();
        state.files.retain(|key, _| {
            if key == &resolved {
                return true;
            }
            let matches = key.starts_with(&prefix)
                && key.ends_with(&extension)
                && key
                    .rsplit_once('/')
                    .is_some_and(|(p, n)| p == parent && dated.is_match(n));
            !matches
        });
        Ok(())
    }

    fn load_dict_from_file(&self, path: &str, _suffix: Option<&str>) -> Result<Value> {
        let state = self.state.lock().unwrap();
        let file = state
            .files
            .get(&self.key(path))
            .ok_or_else(|| mister_downloader::Error::IoError(format!("no file at {path}")))?;
        if let Some(json) = &file.json {
            return Ok(json.clone());
        }
        if let Some(content) = &file.content {
            return serde_json::from_str(content).map_err(|e| {
                mister_downloader::Error::ParseError(format!("invalid JSON at {path}: {e}"))
            });
        }
        Err(mister_downloader::Error::ParseError(format!("no JSON at {path}")))
    }

    fn save_json_on_zip(&self, value: &Value, path: &str) -> Result<()> {
        self.insert_file(
            path,
            FakeFile {
                hash: path.to_string(),
                json: Some(value.clone()),
                ..FakeFile::default()
            },
        );
        Ok(())
    }

    fn unzip_contents(&self, file: &str, _target: &str) -> Result<()> {
        let archive_key = self.key(file);
        let archive = self
            .state
            .lock()
            .unwrap()
            .files
            .get(&archive_key)
            .cloned()
            .ok_or_else(|| mister_downloader::Error::UnzipError(format!("no archive at {file}")))?;

        let Some((files, folders)) = archive.zipped_files else {
            return Err(mister_downloader::Error::UnzipError(format!(
                "archive {file} has no contents scripted"
            )));
        };

        let keys: Vec<(String, FakeFile)> = files
            .into_iter()
            .map(|(path, entry)| (self.key(&path), entry))
            .collect();
        let folder_keys: Vec<String> = folders.iter().map(|f| self.key(f)).collect();

        let mut state = self.state.lock().unwrap();
        for (key, entry) in keys {
            state.files.insert(key, entry);
        }
        for key in folder_keys {
            state.folders.insert(key);
        }
        state.files.remove(&archive_key);
        Ok(())
    }

    fn temp_file(&self) -> Result<String> {
        let id = self.temp_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("/tmp/temp_file_{id}"))
    }

    fn unique_temp_filename(&self) -> Result<ReservedTempName> {
        let id = self.temp_counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("/tmp/downloader_unique_{id}");
        self.temp_reservations.lock().unwrap().insert(name.clone());
        Ok(ReservedTempName::new(name, Arc::clone(&self.temp_reservations)))
    }
}

fn dated_sibling_regex() -> regex::Regex {
    regex::Regex::new(r"^(.+_)[0-9]{8}([.][a-z0-9]+)$").unwrap()
}

/// Scripted state shared between a factory and the downloaders it creates
#[derive(Default)]
struct DownloaderScript {
    /// Target paths that must fail
    errors_at: HashSet<String>,
    /// JSON payloads attached to downloads, keyed by source url
    remote_json: HashMap<String, Value>,
    /// Archive contents attached to downloads, keyed by source url
    remote_zips: HashMap<String, (Vec<(String, FakeFile)>, Vec<String>)>,
}

/// Factory producing [`FakeFileDownloader`]s bound to an in-memory filesystem
pub struct FakeDownloaderFactory {
    file_system: Arc<InMemoryFileSystem>,
    script: Arc<Mutex<DownloaderScript>>,
}

impl FakeDownloaderFactory {
    pub fn new(file_system: Arc<InMemoryFileSystem>) -> Arc<Self> {
        Arc::new(Self {
            file_system,
            script: Arc::new(Mutex::new(DownloaderScript::default())),
        })
    }

    /// Make every download of `target` fail
    pub fn errors_at(&self, target: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .errors_at
            .insert(target.to_string());
        self
    }

    /// Downloads from `url` produce a file whose JSON payload is `value`
    pub fn with_remote_json(&self, url: &str, value: Value) -> &Self {
        self.script
            .lock()
            .unwrap()
            .remote_json
            .insert(url.to_string(), value);
        self
    }

    /// Downloads from `url` produce an archive extracting to these files
    /// and folders
    pub fn with_remote_zip(
        &self,
        url: &str,
        files: Vec<(String, FakeFile)>,
        folders: Vec<String>,
    ) -> &Self {
        self.script
            .lock()
            .unwrap()
            .remote_zips
            .insert(url.to_string(), (files, folders));
        self
    }
}

impl FileDownloaderFactory for FakeDownloaderFactory {
    fn create(&self, _config: &Config, _options: DownloaderOptions) -> Box<dyn FileDownloader> {
        Box::new(FakeFileDownloader {
            file_system: Arc::clone(&self.file_system),
            script: Arc::clone(&self.script),
            queued: Vec::new(),
            downloaded: Vec::new(),
            errors: Vec::new(),
        })
    }
}

/// Materializes queued downloads straight into the in-memory filesystem
pub struct FakeFileDownloader {
    file_system: Arc<InMemoryFileSystem>,
    script: Arc<Mutex<DownloaderScript>>,
    queued: Vec<(FileDescriptor, String)>,
    downloaded: Vec<String>,
    errors: Vec<String>,
}

impl FileDownloader for FakeFileDownloader {
    fn queue_file(&mut self, descriptor: FileDescriptor, target_path: &str) {
        self.queued.push((descriptor, target_path.to_string()));
    }

    fn download_files(&mut self) {
        let script = self.script.lock().unwrap();
        for (descriptor, target) in self.queued.drain(..) {
            if script.errors_at.contains(&target) {
                self.errors.push(target);
                continue;
            }

            let mut file = FakeFile::with_hash(&descriptor.hash, descriptor.size);
            if let Some(url) = descriptor.url.as_deref() {
                if let Some(json) = script.remote_json.get(url) {
                    file.json = Some(json.clone());
                }
                if let Some(contents) = script.remote_zips.get(url) {
                    file.zipped_files = Some(contents.clone());
                }
            }
            self.file_system.insert_file(&target, file);
            self.downloaded.push(target);
        }
    }

    fn correctly_downloaded_files(&self) -> &[String] {
        &self.downloaded
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }
}
