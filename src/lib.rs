// src/lib.rs

//! MiSTer content downloader
//!
//! Keeps an SD-card-backed MiSTer device in sync with remote databases:
//! JSON manifests naming files, folders and zipped content bundles to be
//! installed under the configured base path.
//!
//! # Architecture
//!
//! - Store-driven: a persistent JSON store records what the tool installed,
//!   so each run is a diff against it (and the disk), not a blind download
//! - Injected seams: all disk access goes through [`filesystem::FileSystem`]
//!   and all transfers through [`downloader::FileDownloader`], with
//!   production and in-memory-fake variants
//! - Databases are processed in configuration order; paths claimed twice are
//!   first-writer-wins

pub mod config;
pub mod constants;
pub mod db;
pub mod downloader;
mod error;
pub mod filesystem;
pub mod filter;
pub mod full_run;
pub mod importer;
pub mod linux_updater;
pub mod reboot_calculator;
pub mod store;

pub use config::{AllowDelete, AllowReboot, Config, DbOptions, Description, Env, UpdateLinuxEnv};
pub use db::{DbEntity, DbGateway, FileDescriptor, FolderDescriptor, ZipDescriptor, ZipKind};
pub use error::{Error, Result};
pub use filesystem::{FileSystem, ProductionFileSystem, ReservedTempName};
pub use filter::FileFilter;
pub use full_run::FullRunService;
pub use importer::{ImporterCommand, OfflineImporter, OnlineImporter};
pub use linux_updater::LinuxUpdater;
pub use reboot_calculator::RebootCalculator;
pub use store::{DbStore, LocalRepository, LocalStore, StoreMigrator};
