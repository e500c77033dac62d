// src/db/descriptors.rs

//! Record types for database manifest entries
//!
//! Manifests are dynamic JSON; these are the closed shapes the rest of the
//! tool works against. Optional fields stay optional instead of being
//! defaulted so store round-trips preserve exactly what a manifest declared.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hash value meaning "do not verify"
pub const HASH_IGNORE: &str = "ignore";

/// One installable file as declared by a database or a zip summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Where to fetch it. Absent for files that arrive inside a zip bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// MD5 hex, or `"ignore"`
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    /// Owning zip bundle, when the file came from a zip summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_id: Option<String>,
    /// Tag ids from the database `tag_dictionary`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<u32>>,
    /// `[true]` requests previous-dated-version cleanup after install
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<bool>>,
    /// `false` marks the file overwrite-protected once present on disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    /// Installing this file requires a reboot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reboot: Option<bool>,
}

impl FileDescriptor {
    pub fn new(url: impl Into<String>, hash: impl Into<String>, size: u64) -> Self {
        Self {
            url: Some(url.into()),
            hash: hash.into(),
            size,
            zip_id: None,
            tags: None,
            delete: None,
            overwrite: None,
            reboot: None,
        }
    }

    /// True when the descriptor's hash should not be verified
    pub fn hash_is_ignored(&self) -> bool {
        self.hash == HASH_IGNORE
    }

    /// True when `delete: [true]` asks for dated-sibling cleanup
    pub fn wants_previous_cleanup(&self) -> bool {
        self.delete
            .as_ref()
            .is_some_and(|flags| flags.first().copied().unwrap_or(false))
    }

    /// The shape stored after install. Zip-delivered files drop their url
    /// (the bundle is the source, not the url) but keep their tags so later
    /// runs can re-filter store-held entries; plain files keep their url and
    /// drop the tags they no longer need.
    pub fn into_store_entry(mut self) -> Self {
        if self.zip_id.is_some() {
            self.url = None;
        } else {
            self.tags = None;
        }
        self
    }
}

/// One folder as declared by a database or a zip summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<u32>>,
}

impl FolderDescriptor {
    /// The shape stored after reconcile; same tag rule as files
    pub fn into_store_entry(mut self) -> Self {
        if self.zip_id.is_none() {
            self.tags = None;
        }
        self
    }
}

/// How a zip bundle's contents land on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZipKind {
    /// Every archive entry is extracted under the target folder
    ExtractAllContents,
    /// The archive carries a single file
    SingleContents,
}

/// A zipped content bundle: a summary manifest plus the archive itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipDescriptor {
    pub summary_file: FileDescriptor,
    pub contents_file: FileDescriptor,
    pub kind: ZipKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_files_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_folder_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_summary: Option<ZipSummary>,
}

/// The file/folder subset a zip summary manifest enumerates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZipSummary {
    #[serde(default)]
    pub files: BTreeMap<String, FileDescriptor>,
    #[serde(default)]
    pub folders: BTreeMap<String, FolderDescriptor>,
}

/// A database's Linux image declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinuxDescriptor {
    #[serde(flatten)]
    pub file: FileDescriptor,
    pub version: String,
}
