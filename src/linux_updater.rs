// src/linux_updater.rs

//! Linux image updater
//!
//! When a database declares a `linux` block and its version differs from the
//! installed one, the updater downloads the image archive (and the 7z
//! extractor if missing) serially, then drives the same shell sequence the
//! SD installer uses: verify, extract to a staging directory, move into
//! place with `linux.img` last, refresh the bootloader, and touch the
//! reboot marker. Any failure aborts without touching the installed image.

use crate::config::Config;
use crate::constants::{
    FILE_LINUX_7Z, FILE_LINUX_7Z_GZ, FILE_MISTER_VERSION, FILE_NEEDS_REBOOT_AFTER_LINUX_UPDATE,
    HASH_LINUX_7Z_GZ, SIZE_LINUX_7Z_GZ, URL_LINUX_7Z_GZ,
};
use crate::db::{FileDescriptor, LinuxDescriptor};
use crate::downloader::{DownloaderOptions, FileDownloaderFactory};
use crate::error::Result;
use crate::filesystem::FileSystem;
use crate::importer::ImporterCommand;
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

const LINUX_ARCHIVE_PATH: &str = "linux.7z";

pub struct LinuxUpdater {
    config: Config,
    file_system: Arc<dyn FileSystem>,
    downloader_factory: Arc<dyn FileDownloaderFactory>,
}

impl LinuxUpdater {
    pub fn new(
        config: Config,
        file_system: Arc<dyn FileSystem>,
        downloader_factory: Arc<dyn FileDownloaderFactory>,
    ) -> Self {
        Self {
            config,
            file_system,
            downloader_factory,
        }
    }

    /// Run the update if exactly the first `linux`-declaring database asks
    /// for a version that is not installed
    pub fn update_linux(&self, command: &ImporterCommand) -> Result<()> {
        debug!("Running update_linux");

        let declarations: Vec<(&str, &LinuxDescriptor)> = command
            .parts()
            .iter()
            .filter_map(|part| part.db.linux.as_ref().map(|linux| (part.db.db_id.as_str(), linux)))
            .collect();

        let Some((db_id, linux)) = declarations.first().copied() else {
            debug!("No database declares a linux block");
            return Ok(());
        };

        if declarations.len() > 1 {
            println!("Too many databases try to update linux.");
            println!("Only 1 can be processed.");
            println!("Ignoring:");
            for (ignored, _) in &declarations[1..] {
                println!(" - {ignored}");
            }
            println!();
        }

        let current_version = if self.file_system.is_file(FILE_MISTER_VERSION) {
            self.file_system.read_file_contents(FILE_MISTER_VERSION)?
        } else {
            "unknown".to_string()
        };

        let latest_version = last_six(&linux.version);
        if current_version == latest_version {
            debug!(
                "Installed linux version {} already matches {}",
                current_version, linux.version
            );
            return Ok(());
        }

        println!("Linux will be updated from {db_id}:");
        println!("Current linux version -> {current_version}");
        println!("Latest linux version -> {latest_version}");
        println!();

        let mut downloader = self.downloader_factory.create(
            &self.config,
            DownloaderOptions {
                parallel: false,
                silent: false,
                hash_check: true,
            },
        );

        downloader.queue_file(linux.file.clone(), LINUX_ARCHIVE_PATH);
        if !self.file_system.is_file(FILE_LINUX_7Z) {
            downloader.queue_file(
                FileDescriptor::new(URL_LINUX_7Z_GZ, HASH_LINUX_7Z_GZ, SIZE_LINUX_7Z_GZ),
                FILE_LINUX_7Z_GZ,
            );
        }

        downloader.download_files();
        println!();

        if !downloader.errors().is_empty() {
            println!("Some error happened during the Linux download:");
            for error in downloader.errors() {
                println!("{error}");
            }
            println!();
            return Ok(());
        }

        self.run_install_subprocesses(linux)
    }

    /// The Linux update shell sequence has run and asked for a reboot
    pub fn needs_reboot(&self) -> bool {
        self.file_system.is_file(FILE_NEEDS_REBOOT_AFTER_LINUX_UPDATE)
    }

    fn run_install_subprocesses(&self, linux: &LinuxDescriptor) -> Result<()> {
        if self.file_system.is_file(FILE_LINUX_7Z_GZ) {
            let status = run_shell(&format!("gunzip \"{FILE_LINUX_7Z_GZ}\""))?;
            let _ = self.file_system.unlink(FILE_LINUX_7Z_GZ);
            if status != 0 {
                println!("ERROR! Could not install 7z.");
                println!("Error code: {status}");
                println!();
                return Ok(());
            }
        }

        if !self.file_system.is_file(FILE_LINUX_7Z) {
            println!("ERROR! 7z is not present in the system.");
            println!("Aborting Linux update.");
            println!();
            return Ok(());
        }

        let archive = self.file_system.download_target_path(LINUX_ARCHIVE_PATH);
        let status = run_shell(&format!(
            r#"
                sync
                RET_CODE=
                if {FILE_LINUX_7Z} t "{archive}" ; then
                    if [ -d /media/fat/linux.update ]
                    then
                        rm -R "/media/fat/linux.update" > /dev/null 2>&1
                    fi
                    mkdir "/media/fat/linux.update"
                    if {FILE_LINUX_7Z} x -y "{archive}" files/linux/* -o"/media/fat/linux.update" ; then
                        RET_CODE=0
                    else
                        rm -R "/media/fat/linux.update" > /dev/null 2>&1
                        sync
                        RET_CODE=101
                    fi
                else
                    echo "Downloaded installer 7z is broken, deleting {archive}"
                    RET_CODE=102
                fi
                rm "{archive}" > /dev/null 2>&1
                exit $RET_CODE
            "#
        ))?;

        if status != 0 {
            println!("ERROR! Could not uncompress the linux installer.");
            println!("Error code: {status}");
            println!();
            return Ok(());
        }

        println!();
        println!("======================================================================================");
        println!("Hold your breath: updating the Kernel, the Linux filesystem, the bootloader and stuff.");
        println!("Stopping this will make your SD unbootable!");
        println!();
        println!("If something goes wrong, please download the SD Installer from");
        println!("{}", linux.file.url.as_deref().unwrap_or(""));
        println!("and copy the content of the files/linux/ directory in the linux directory of the SD.");
        println!("Reflash the bootloader with the SD Installer if needed.");
        println!("======================================================================================");
        println!();

        let status = run_shell(&format!(
            r#"
                sync
                mv -f "/media/fat/linux.update/files/linux/linux.img" "/media/fat/linux/linux.img.new"
                mv -f "/media/fat/linux.update/files/linux/"* "/media/fat/linux/"
                rm -R "/media/fat/linux.update" > /dev/null 2>&1
                sync
                /media/fat/linux/updateboot
                sync
                mv -f "/media/fat/linux/linux.img.new" "/media/fat/linux/linux.img"
                sync
                touch {FILE_NEEDS_REBOOT_AFTER_LINUX_UPDATE}
            "#
        ))?;

        if status != 0 {
            println!("ERROR! Something went wrong during the Linux update, try again later.");
            println!("Error code: {status}");
            println!();
        }

        Ok(())
    }
}

fn run_shell(script: &str) -> Result<i32> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(script)
        .status()
        .map_err(|e| crate::error::Error::IoError(format!("could not run shell: {e}")))?;
    Ok(status.code().unwrap_or(-1))
}

fn last_six(version: &str) -> &str {
    let start = version.len().saturating_sub(6);
    &version[start..]
}
