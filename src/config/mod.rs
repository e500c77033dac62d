// src/config/mod.rs

//! Runtime configuration
//!
//! The typed view of the downloader INI plus the per-database option
//! overlays. `reader` turns an INI file into a [`Config`]; the importers work
//! against effective per-database copies produced by [`Config::effective_for`].

mod reader;

pub use reader::{read_config, read_env};

use crate::constants::{DISTRIBUTION_MISTER_DB_ID, DISTRIBUTION_MISTER_DB_URL};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// What the tool is allowed to delete from the SD card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowDelete {
    /// Anything the reconcile decides is gone
    All,
    /// Only `.rbf` cores (previous-version cleanup)
    OldRbf,
    /// Nothing; delete operations succeed as no-ops
    None,
}

impl FromStr for AllowDelete {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "old_rbf" => Ok(Self::OldRbf),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidConfigParameter(format!(
                "allow_delete must be one of all, old_rbf, none; got '{s}'"
            ))),
        }
    }
}

/// When the tool may reboot the device by itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReboot {
    Always,
    OnlyAfterLinuxUpdate,
    Never,
}

impl FromStr for AllowReboot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "only_after_linux_update" => Ok(Self::OnlyAfterLinuxUpdate),
            "never" => Ok(Self::Never),
            _ => Err(Error::InvalidConfigParameter(format!(
                "allow_reboot must be one of always, only_after_linux_update, never; got '{s}'"
            ))),
        }
    }
}

/// One configured database: where its manifest lives and how to treat it
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    /// `http(s)://…` or a filesystem path (absolute or relative to base)
    pub db_url: String,
    /// The database id the manifest must declare
    pub section: String,
    /// Per-database overrides from the INI section
    pub options: Option<DbOptions>,
}

/// Option overlay: INI database sections and manifest `default_options`
/// both deserialize into this
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_update: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_linux: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloader_size_mb_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloader_process_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloader_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloader_retries: Option<u32>,
}

impl DbOptions {
    /// Overlay every set field onto `config`
    pub fn apply_to(&self, config: &mut Config) {
        self.apply(config, |_| true);
    }

    /// Overlay only the fields the user did not set explicitly in the INI.
    /// Used for manifest `default_options`, which must never beat the user.
    pub fn apply_unless_user_defined(&self, config: &mut Config) {
        let user_defined = config.user_defined_options.clone();
        self.apply(config, |key| !user_defined.contains(key));
    }

    fn apply(&self, config: &mut Config, wanted: impl Fn(&str) -> bool) {
        if let Some(filter) = &self.filter
            && wanted("filter")
        {
            config.filter = Some(filter.clone());
        }
        if let Some(parallel_update) = self.parallel_update
            && wanted("parallel_update")
        {
            config.parallel_update = parallel_update;
        }
        if let Some(update_linux) = self.update_linux
            && wanted("update_linux")
        {
            config.update_linux = update_linux;
        }
        if let Some(limit) = self.downloader_size_mb_limit
            && wanted("downloader_size_mb_limit")
        {
            config.downloader_size_mb_limit = limit;
        }
        if let Some(limit) = self.downloader_process_limit
            && wanted("downloader_process_limit")
        {
            config.downloader_process_limit = limit;
        }
        if let Some(timeout) = self.downloader_timeout
            && wanted("downloader_timeout")
        {
            config.downloader_timeout = timeout;
        }
        if let Some(retries) = self.downloader_retries
            && wanted("downloader_retries")
        {
            config.downloader_retries = retries;
        }
    }
}

/// Global configuration for a run
#[derive(Debug, Clone)]
pub struct Config {
    pub base_path: String,
    pub base_system_path: String,
    pub allow_delete: AllowDelete,
    pub allow_reboot: AllowReboot,
    pub update_linux: bool,
    pub parallel_update: bool,
    pub check_manually_deleted_files: bool,
    pub downloader_size_mb_limit: u64,
    pub downloader_process_limit: usize,
    pub downloader_timeout: u64,
    pub downloader_retries: u32,
    pub zip_file_count_threshold: usize,
    pub filter: Option<String>,
    pub verbose: bool,
    /// The INI path this config was read from; names the log and run markers
    pub config_path: String,
    /// Databases in INI declaration order. Cross-database first-writer-wins
    /// depends on this order being stable.
    pub databases: Vec<Description>,
    /// Keys the user set explicitly; manifest defaults never override these
    pub user_defined_options: HashSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: "/media/fat".to_string(),
            base_system_path: "/media/fat".to_string(),
            allow_delete: AllowDelete::All,
            allow_reboot: AllowReboot::Always,
            update_linux: true,
            parallel_update: true,
            check_manually_deleted_files: true,
            downloader_size_mb_limit: 100,
            downloader_process_limit: 300,
            downloader_timeout: 300,
            downloader_retries: 3,
            zip_file_count_threshold: 60,
            filter: None,
            verbose: false,
            config_path: String::new(),
            databases: Vec::new(),
            user_defined_options: HashSet::new(),
        }
    }
}

impl Config {
    /// The default database list used when the INI declares none
    pub fn default_databases() -> Vec<Description> {
        vec![Description {
            db_url: DISTRIBUTION_MISTER_DB_URL.to_string(),
            section: DISTRIBUTION_MISTER_DB_ID.to_string(),
            options: None,
        }]
    }

    /// Build the effective config for one database: global values overlaid
    /// with the manifest's `default_options` and then the INI section options.
    pub fn effective_for(
        &self,
        default_options: Option<&DbOptions>,
        description_options: Option<&DbOptions>,
    ) -> Config {
        let mut effective = self.clone();
        if let Some(defaults) = default_options {
            defaults.apply_unless_user_defined(&mut effective);
        }
        if let Some(options) = description_options {
            options.apply_to(&mut effective);
        }
        effective
    }

    pub fn description_for(&self, section: &str) -> Option<&Description> {
        self.databases.iter().find(|d| d.section == section)
    }
}

/// `UPDATE_LINUX` environment values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateLinuxEnv {
    True,
    False,
    Only,
}

/// Process environment relevant to a run
#[derive(Debug, Clone)]
pub struct Env {
    pub update_linux: UpdateLinuxEnv,
    pub fail_on_file_error: bool,
    pub commit: String,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            update_linux: UpdateLinuxEnv::True,
            fail_on_file_error: false,
            commit: "unknown".to_string(),
        }
    }
}
