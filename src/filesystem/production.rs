// src/filesystem/production.rs

//! Real filesystem implementation
//!
//! MD5 is streamed in 8 KiB chunks. Moves are atomic renames. Zip handling
//! covers the three uses the tool has: a JSON manifest inside an archive,
//! the zipped store file, and bulk extraction of content bundles.

use super::{resolve_under_base, FileSystem, ReservedTempName};
use crate::config::{AllowDelete, Config};
use crate::error::{Error, Result};
use md5::{Digest, Md5};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const HASH_BUFFER_SIZE: usize = 8192;

/// On-device filesystem rooted at the configured base paths
pub struct ProductionFileSystem {
    base_path: String,
    base_system_path: String,
    allow_delete: AllowDelete,
    system_paths: Mutex<HashSet<String>>,
    temp_reservations: Arc<Mutex<HashSet<String>>>,
}

impl ProductionFileSystem {
    pub fn new(config: &Config) -> Self {
        Self {
            base_path: config.base_path.clone(),
            base_system_path: config.base_system_path.clone(),
            allow_delete: config.allow_delete,
            system_paths: Mutex::new(HashSet::new()),
            temp_reservations: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn path(&self, path: &str) -> String {
        let system_paths = self.system_paths.lock().unwrap_or_else(|e| e.into_inner());
        resolve_under_base(path, &self.base_path, &self.base_system_path, &system_paths)
    }

    fn unlink_unchecked(&self, path: &str, verbose: bool) -> Result<bool> {
        if verbose {
            info!("Removing {}", path);
        }
        match fs::remove_file(self.path(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::IoError(format!("could not remove {path}: {e}"))),
        }
    }
}

impl FileSystem for ProductionFileSystem {
    fn resolve(&self, path: &str) -> String {
        self.path(path)
    }

    fn add_system_path(&self, path: &str) {
        self.system_paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string());
    }

    fn is_file(&self, path: &str) -> bool {
        Path::new(&self.path(path)).is_file()
    }

    fn is_folder(&self, path: &str) -> bool {
        Path::new(&self.path(path)).is_dir()
    }

    fn read_file_contents(&self, path: &str) -> Result<String> {
        fs::read_to_string(self.path(path))
            .map_err(|e| Error::IoError(format!("could not read {path}: {e}")))
    }

    fn write_file_contents(&self, path: &str, content: &str) -> Result<()> {
        fs::write(self.path(path), content)
            .map_err(|e| Error::IoError(format!("could not write {path}: {e}")))
    }

    fn touch(&self, path: &str) -> Result<()> {
        let resolved = self.path(path);
        if let Some(parent) = Path::new(&resolved).parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::IoError(format!("could not create {}: {e}", parent.display())))?;
        }
        File::options()
            .create(true)
            .append(true)
            .open(&resolved)
            .map_err(|e| Error::IoError(format!("could not touch {path}: {e}")))?;
        Ok(())
    }

    fn move_file(&self, source: &str, target: &str) -> Result<()> {
        self.make_dirs_parent(target)?;
        fs::rename(self.path(source), self.path(target))
            .map_err(|e| Error::IoError(format!("could not move {source} to {target}: {e}")))
    }

    fn copy_file(&self, source: &str, target: &str) -> Result<()> {
        fs::copy(self.path(source), self.path(target))
            .map_err(|e| Error::IoError(format!("could not copy {source} to {target}: {e}")))?;
        Ok(())
    }

    fn hash(&self, path: &str) -> Result<String> {
        let resolved = self.path(path);
        let mut file = File::open(&resolved)
            .map_err(|e| Error::IoError(format!("could not open {path} for hashing: {e}")))?;

        let mut hasher = Md5::new();
        let mut buffer = [0u8; HASH_BUFFER_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .map_err(|e| Error::IoError(format!("could not read {path} for hashing: {e}")))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    fn make_dirs(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.path(path))
            .map_err(|e| Error::IoError(format!("could not create {path}: {e}")))
    }

    fn make_dirs_parent(&self, path: &str) -> Result<()> {
        let resolved = self.path(path);
        if let Some(parent) = Path::new(&resolved).parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::IoError(format!("could not create {}: {e}", parent.display())))?;
        }
        Ok(())
    }

    fn folder_has_items(&self, path: &str) -> bool {
        fs::read_dir(self.path(path))
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    fn remove_folder(&self, path: &str) -> Result<()> {
        if self.allow_delete != AllowDelete::All {
            return Ok(());
        }
        info!("Deleting empty folder {}", path);
        fs::remove_dir(self.path(path))
            .map_err(|e| Error::IoError(format!("could not remove folder {path}: {e}")))
    }

    fn download_target_path(&self, path: &str) -> String {
        self.path(path)
    }

    fn unlink(&self, path: &str) -> Result<bool> {
        let verbose = !path.starts_with("/tmp/");
        if self.allow_delete != AllowDelete::All {
            if self.allow_delete == AllowDelete::OldRbf && path.to_lowercase().ends_with(".rbf") {
                return self.unlink_unchecked(path, verbose);
            }
            return Ok(true);
        }
        self.unlink_unchecked(path, verbose)
    }

    fn delete_previous(&self, path: &str) -> Result<()> {
        if self.allow_delete != AllowDelete::All {
            return Ok(());
        }

        let resolved = self.path(path);
        let resolved = Path::new(&resolved);
        let Some(parent) = resolved.parent() else {
            return Ok(());
        };
        if !parent.is_dir() {
            return Ok(());
        }
        let Some(name) = resolved.file_name().and_then(|n| n.to_str()) else {
            return Ok(());
        };

        let dated = Regex::new(r"^(.+_)[0-9]{8}([.][a-zA-Z0-9]+)$")
            .map_err(|e| Error::ParseError(e.to_string()))?;
        let Some(captures) = dated.captures(name) else {
            return Ok(());
        };
        let prefix = captures[1].to_lowercase();
        let extension = captures[2].to_lowercase();

        let entries = fs::read_dir(parent)
            .map_err(|e| Error::IoError(format!("could not list {}: {e}", parent.display())))?;

        let own_name = name.to_lowercase();
        let mut deleted = false;
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::IoError(format!("could not list {}: {e}", parent.display())))?;
            let Some(sibling) = entry.file_name().to_str().map(str::to_lowercase) else {
                continue;
            };
            if sibling != own_name
                && sibling.starts_with(&prefix)
                && sibling.ends_with(&extension)
                && dated.is_match(&sibling)
            {
                fs::remove_file(entry.path()).map_err(|e| {
                    Error::IoError(format!("could not remove {}: {e}", entry.path().display()))
                })?;
                deleted = true;
            }
        }

        if deleted {
            info!("Deleted previous \"{}\"* files.", prefix);
        }
        Ok(())
    }

    fn load_dict_from_file(&self, path: &str, suffix: Option<&str>) -> Result<Value> {
        let resolved = self.path(path);
        let suffix = match suffix {
            Some(suffix) => suffix.to_lowercase(),
            None => Path::new(&resolved)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_lowercase()))
                .unwrap_or_default(),
        };

        match suffix.as_str() {
            ".json" => {
                let contents = fs::read_to_string(&resolved)
                    .map_err(|e| Error::IoError(format!("could not read {path}: {e}")))?;
                serde_json::from_str(&contents)
                    .map_err(|e| Error::ParseError(format!("invalid JSON in {path}: {e}")))
            }
            ".zip" => load_json_from_zip(&resolved),
            other => Err(Error::ParseError(format!(
                "file type '{other}' not supported for {path}"
            ))),
        }
    }

    fn save_json_on_zip(&self, value: &Value, path: &str) -> Result<()> {
        let resolved = self.path(path);
        let entry_name = Path::new(&resolved)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("contents.json")
            .to_string();

        let file = File::create(&resolved)
            .map_err(|e| Error::IoError(format!("could not create {path}: {e}")))?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let serialized = serde_json::to_vec(value)
            .map_err(|e| Error::ParseError(format!("could not serialize {path}: {e}")))?;
        writer
            .start_file(entry_name.as_str(), options)
            .map_err(|e| Error::IoError(format!("could not write zip {path}: {e}")))?;
        writer
            .write_all(&serialized)
            .map_err(|e| Error::IoError(format!("could not write zip {path}: {e}")))?;
        writer
            .finish()
            .map_err(|e| Error::IoError(format!("could not write zip {path}: {e}")))?;
        Ok(())
    }

    fn unzip_contents(&self, file: &str, target: &str) -> Result<()> {
        let archive_path = self.path(file);
        let target_path = self.path(target);

        let archive_file = File::open(&archive_path)
            .map_err(|e| Error::UnzipError(format!("could not open {file}: {e}")))?;
        let mut archive = zip::ZipArchive::new(archive_file)
            .map_err(|e| Error::UnzipError(format!("could not read {file}: {e}")))?;
        archive
            .extract(&target_path)
            .map_err(|e| Error::UnzipError(format!("could not unzip {file}: {e}")))?;

        debug!("Extracted {} into {}", file, target);
        self.unlink_unchecked(file, false)?;
        Ok(())
    }

    fn temp_file(&self) -> Result<String> {
        let temp = tempfile::Builder::new()
            .prefix("temp_file")
            .tempfile()
            .map_err(|e| Error::IoError(format!("could not create temp file: {e}")))?;
        let path = temp
            .into_temp_path()
            .keep()
            .map_err(|e| Error::IoError(format!("could not keep temp file: {e}")))?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn unique_temp_filename(&self) -> Result<ReservedTempName> {
        let mut reservations = self
            .temp_reservations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        loop {
            let candidate = tempfile::Builder::new()
                .prefix("downloader_")
                .tempfile()
                .map_err(|e| Error::IoError(format!("could not reserve temp name: {e}")))?;
            let name = candidate.path().to_string_lossy().into_owned();
            drop(candidate);
            if reservations.insert(name.clone()) {
                return Ok(ReservedTempName::new(name, Arc::clone(&self.temp_reservations)));
            }
        }
    }
}

fn load_json_from_zip(resolved: &str) -> Result<Value> {
    let file = File::open(resolved)
        .map_err(|e| Error::IoError(format!("could not open {resolved}: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::UnzipError(format!("could not read {resolved}: {e}")))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::UnzipError(format!("could not read {resolved}: {e}")))?;
        if !entry.is_file() {
            continue;
        }
        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .map_err(|e| Error::IoError(format!("could not read entry of {resolved}: {e}")))?;
        return serde_json::from_str(&contents)
            .map_err(|e| Error::ParseError(format!("invalid JSON in {resolved}: {e}")));
    }

    Err(Error::ParseError(format!("no JSON entry inside {resolved}")))
}
