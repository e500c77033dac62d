// src/store/mod.rs

//! The persistent local store
//!
//! Records everything the tool has installed so later runs can diff against
//! it. One [`DbStore`] slice per configured database; the whole document is
//! versioned and migrated forward by [`StoreMigrator`].

mod migrations;
mod repository;

pub use migrations::{StoreMigrator, LATEST_STORE_VERSION};
pub use repository::LocalRepository;

use crate::db::{FileDescriptor, FolderDescriptor, ZipDescriptor, ZipSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The whole persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalStore {
    pub version: u32,
    #[serde(default)]
    pub dbs: BTreeMap<String, DbStore>,
}

impl LocalStore {
    /// An empty store at the current schema version
    pub fn new() -> Self {
        Self {
            version: LATEST_STORE_VERSION,
            dbs: BTreeMap::new(),
        }
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

/// What one database has installed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbStore {
    #[serde(default)]
    pub files: BTreeMap<String, FileDescriptor>,
    #[serde(default)]
    pub folders: BTreeMap<String, FolderDescriptor>,
    #[serde(default)]
    pub zips: BTreeMap<String, ZipDescriptor>,
    /// MD5 hashes of pre-seed database files already ingested
    #[serde(default)]
    pub offline_databases_imported: Vec<String>,
    /// Entries a filter excluded, kept per zip so a relaxed filter can
    /// re-materialize them without re-fetching the summary
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filtered_zip_data: BTreeMap<String, ZipSummary>,
}

impl DbStore {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.folders.is_empty()
            && self.zips.is_empty()
            && self.offline_databases_imported.is_empty()
            && self.filtered_zip_data.is_empty()
    }
}
