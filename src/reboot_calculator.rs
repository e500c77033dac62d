// src/reboot_calculator.rs

//! Reboot decision
//!
//! Combines the linux-updater and importer reboot flags with the
//! `allow_reboot` policy. When a reboot is needed but policy forbids doing
//! it automatically, a marker file records the pending reboot for the user.

use crate::config::{AllowReboot, Config};
use crate::constants::FILE_DOWNLOADER_NEEDS_REBOOT;
use crate::error::Result;
use crate::filesystem::FileSystem;
use std::sync::Arc;
use tracing::debug;

pub struct RebootCalculator {
    config: Config,
    file_system: Arc<dyn FileSystem>,
}

impl RebootCalculator {
    pub fn new(config: Config, file_system: Arc<dyn FileSystem>) -> Self {
        file_system.add_system_path(FILE_DOWNLOADER_NEEDS_REBOOT);
        Self {
            config,
            file_system,
        }
    }

    /// Returns whether the tool should reboot the device right now.
    ///
    /// When something needs a reboot that policy disallows, the marker file
    /// is touched and `false` returned.
    pub fn calc_needs_reboot(
        &self,
        linux_needs_reboot: bool,
        importer_needs_reboot: bool,
    ) -> Result<bool> {
        if !linux_needs_reboot && !importer_needs_reboot {
            return Ok(false);
        }

        let allowed = match self.config.allow_reboot {
            AllowReboot::Always => true,
            AllowReboot::OnlyAfterLinuxUpdate => linux_needs_reboot,
            AllowReboot::Never => false,
        };

        if allowed {
            return Ok(true);
        }

        debug!("Reboot is needed but not allowed by policy, leaving marker");
        self.file_system.touch(FILE_DOWNLOADER_NEEDS_REBOOT)?;
        Ok(false)
    }
}
