// src/constants.rs

//! On-device paths and built-in values shared across components

/// MiSTer main binary, relative to the base path
pub const FILE_MISTER: &str = "MiSTer";

/// Where the running main binary is parked before being overwritten
pub const FILE_MISTER_OLD: &str = ".MiSTer.old";

/// Temporary target used while downloading a new main binary
pub const FILE_MISTER_NEW: &str = "MiSTer.new";

/// Contents identify the currently installed Linux image version
pub const FILE_MISTER_VERSION: &str = "/MiSTer.version";

/// The 7z extractor used by the Linux updater
pub const FILE_LINUX_7Z: &str = "/media/fat/linux/7za";

/// Gzipped 7z extractor as shipped by the SD installer
pub const FILE_LINUX_7Z_GZ: &str = "/media/fat/linux/7za.gz";

/// Pinned source for the 7z extractor
pub const URL_LINUX_7Z_GZ: &str =
    "https://github.com/MiSTer-devel/SD-Installer-Win64_MiSTer/raw/master/7za.gz";
pub const HASH_LINUX_7Z_GZ: &str = "ed1ad5185fbede55cd7fd506b3c6c699";
pub const SIZE_LINUX_7Z_GZ: u64 = 465600;

/// Touched by the Linux update shell sequence; checked by `needs_reboot`
pub const FILE_NEEDS_REBOOT_AFTER_LINUX_UPDATE: &str =
    "/tmp/downloader_needs_reboot_after_linux_update";

/// Marker left when a reboot is required but policy forbids doing it now
pub const FILE_DOWNLOADER_NEEDS_REBOOT: &str =
    "Scripts/.config/downloader/downloader_needs_reboot";

/// Persistent store, zipped JSON
pub const FILE_DOWNLOADER_STORAGE: &str = "Scripts/.config/downloader/downloader.json.zip";

/// Directory holding the store, run markers and logs (a system path)
pub const DIR_DOWNLOADER_CONFIG: &str = "Scripts/.config/downloader";

/// Database injected when the INI declares no database section
pub const DISTRIBUTION_MISTER_DB_ID: &str = "distribution_mister";
pub const DISTRIBUTION_MISTER_DB_URL: &str =
    "https://raw.githubusercontent.com/MiSTer-devel/Distribution_MiSTer/main/db.json.zip";

/// INI read when none is given on the command line
pub const DEFAULT_INI_PATH: &str = "/media/fat/downloader.ini";

/// Boot-rom family names that are never overwritten once present on disk.
/// Matched case-insensitively against the end of the install path.
pub const PROTECTED_BOOT_ROMS: [&str; 5] =
    ["boot.rom", "boot0.rom", "boot1.rom", "boot2.rom", "boot3.rom"];

/// Returns true when `path` names a protected boot rom
pub fn is_protected_boot_rom(path: &str) -> bool {
    let lower = path.to_lowercase();
    PROTECTED_BOOT_ROMS.iter().any(|rom| lower.ends_with(rom))
}
