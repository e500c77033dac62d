// src/db/entity.rs

//! Parsed and validated database manifest

use super::descriptors::{
    FileDescriptor, FolderDescriptor, LinuxDescriptor, ZipDescriptor,
};
use crate::config::DbOptions;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A database manifest after schema validation.
///
/// `files` and `folders` are required mappings; everything else is optional.
/// Unknown manifest fields are ignored so databases can evolve ahead of the
/// tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbEntity {
    pub db_id: String,
    pub files: BTreeMap<String, FileDescriptor>,
    pub folders: BTreeMap<String, FolderDescriptor>,
    #[serde(default)]
    pub zips: BTreeMap<String, ZipDescriptor>,
    #[serde(default)]
    pub db_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_files_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_options: Option<DbOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<LinuxDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_dictionary: Option<BTreeMap<String, u32>>,
}

impl DbEntity {
    /// Validate a raw manifest value against the schema and the configured
    /// section it was fetched for.
    pub fn from_value(value: Value, section: &str) -> Result<Self> {
        let entity: DbEntity = serde_json::from_value(value)
            .map_err(|e| Error::InvalidDatabase(format!("malformed manifest: {e}")))?;

        if entity.db_id != section {
            return Err(Error::InvalidDatabase(format!(
                "manifest declares db_id '{}' but was configured as '{}'",
                entity.db_id, section
            )));
        }

        Ok(entity)
    }
}
