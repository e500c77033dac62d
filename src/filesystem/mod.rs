// src/filesystem/mod.rs

//! Filesystem abstraction
//!
//! All disk access goes through the [`FileSystem`] trait so the reconcile
//! engine can run against the production implementation on-device and an
//! in-memory fake under test. Paths are strings relative to the configured
//! base path unless absolute; `add_system_path` reroutes selected relative
//! paths under the system base instead.

mod production;

pub use production::ProductionFileSystem;

use crate::error::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Every filesystem operation the downloader performs
pub trait FileSystem: Send + Sync {
    /// Canonicalize a (possibly relative) local path for direct use
    fn resolve(&self, path: &str) -> String;

    /// Route this relative path under `base_system_path` from now on
    fn add_system_path(&self, path: &str);

    fn is_file(&self, path: &str) -> bool;

    fn is_folder(&self, path: &str) -> bool;

    fn read_file_contents(&self, path: &str) -> Result<String>;

    fn write_file_contents(&self, path: &str, content: &str) -> Result<()>;

    fn touch(&self, path: &str) -> Result<()>;

    /// Atomic rename; parent directories of `target` are created
    fn move_file(&self, source: &str, target: &str) -> Result<()>;

    fn copy_file(&self, source: &str, target: &str) -> Result<()>;

    /// Streaming MD5, lowercase hex
    fn hash(&self, path: &str) -> Result<String>;

    fn make_dirs(&self, path: &str) -> Result<()>;

    fn make_dirs_parent(&self, path: &str) -> Result<()>;

    fn folder_has_items(&self, path: &str) -> bool;

    /// Remove an empty folder; only acts when deletion policy is `ALL`
    fn remove_folder(&self, path: &str) -> Result<()>;

    /// The absolute path a downloader should write `path` to
    fn download_target_path(&self, path: &str) -> String;

    /// Delete a file subject to the deletion policy. Returns whether a file
    /// was actually present; a policy-suppressed delete reports success.
    fn unlink(&self, path: &str) -> Result<bool>;

    /// Delete older dated siblings (`PREFIX_YYYYMMDD.EXT`) of `path`
    fn delete_previous(&self, path: &str) -> Result<()>;

    /// Load JSON from a `.json` file or from the single JSON entry of a
    /// `.zip`; `suffix` overrides extension dispatch
    fn load_dict_from_file(&self, path: &str, suffix: Option<&str>) -> Result<Value>;

    /// Write JSON as the single entry of a zip archive at `path`
    fn save_json_on_zip(&self, value: &Value, path: &str) -> Result<()>;

    /// Extract an archive under `target`, then remove the archive
    fn unzip_contents(&self, file: &str, target: &str) -> Result<()>;

    /// Create an empty temp file and return its absolute path; the caller
    /// unlinks it
    fn temp_file(&self) -> Result<String>;

    /// Reserve a temp file name that no other caller will receive until the
    /// returned guard drops
    fn unique_temp_filename(&self) -> Result<ReservedTempName>;
}

/// A temp file name held in the process-wide reservation set.
///
/// The name is released when the guard drops; the file itself (if the caller
/// created one) is not touched.
pub struct ReservedTempName {
    name: String,
    reservations: Arc<Mutex<HashSet<String>>>,
}

impl ReservedTempName {
    pub fn new(name: String, reservations: Arc<Mutex<HashSet<String>>>) -> Self {
        Self { name, reservations }
    }

    pub fn value(&self) -> &str {
        &self.name
    }
}

impl Drop for ReservedTempName {
    fn drop(&mut self) {
        if let Ok(mut reservations) = self.reservations.lock() {
            reservations.remove(&self.name);
        }
    }
}

/// Shared base-path resolution used by both filesystem variants
pub(crate) fn resolve_under_base(
    path: &str,
    base_path: &str,
    base_system_path: &str,
    system_paths: &HashSet<String>,
) -> String {
    if is_windows_absolute(path) || path.starts_with('/') {
        return path.to_string();
    }
    let base = if system_paths.contains(path) {
        base_system_path
    } else {
        base_path
    };
    format!("{base}/{path}")
}

fn is_windows_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}
