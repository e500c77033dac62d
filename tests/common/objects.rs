// tests/common/objects.rs

//! Builders for the entities the component tests juggle: databases, store
//! slices, descriptors and a wired-up online importer.

use super::{FakeDownloaderFactory, InMemoryFileSystem};
use mister_downloader::config::Config;
use mister_downloader::db::{DbEntity, FileDescriptor, FolderDescriptor};
use mister_downloader::importer::{ImporterCommand, OfflineImporter, OnlineImporter};
use mister_downloader::store::DbStore;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const FILE_A: &str = "a/a.rbf";
pub const FOLDER_A: &str = "a";
pub const FILE_MISTER: &str = "MiSTer";
pub const FILE_MISTER_OLD: &str = ".MiSTer.old";
pub const FILE_BOOT_ROM: &str = "games/boot.rom";

pub fn file_a_descr() -> FileDescriptor {
    FileDescriptor::new("https://fake.com/a/a.rbf", "a_hash", 2915040)
}

pub fn file_a_updated_descr() -> FileDescriptor {
    FileDescriptor::new("https://fake.com/a/a.rbf", "a_updated_hash", 2915040)
}

pub fn file_mister_descr() -> FileDescriptor {
    FileDescriptor::new("https://fake.com/MiSTer", "mister_hash", 2915040)
}

pub fn boot_rom_descr() -> FileDescriptor {
    FileDescriptor::new("https://fake.com/boot.rom", "boot_rom_hash", 32768)
}

pub fn overwrite_file(mut descriptor: FileDescriptor, overwrite: bool) -> FileDescriptor {
    descriptor.overwrite = Some(overwrite);
    descriptor
}

pub fn empty_db(db_id: &str) -> DbEntity {
    DbEntity {
        db_id: db_id.to_string(),
        files: BTreeMap::new(),
        folders: BTreeMap::new(),
        zips: BTreeMap::new(),
        db_files: Vec::new(),
        timestamp: None,
        base_files_url: None,
        default_options: None,
        linux: None,
        tag_dictionary: None,
    }
}

pub fn db_test_being_empty() -> DbEntity {
    empty_db("test")
}

pub fn db_with_file(db_id: &str, path: &str, descriptor: FileDescriptor) -> DbEntity {
    let mut db = empty_db(db_id);
    db.files.insert(path.to_string(), descriptor);
    db
}

pub fn db_test_with_file(path: &str, descriptor: FileDescriptor) -> DbEntity {
    db_with_file("test", path, descriptor)
}

pub fn db_test_with_file_a() -> DbEntity {
    let mut db = db_test_with_file(FILE_A, file_a_descr());
    db.folders.insert(FOLDER_A.to_string(), FolderDescriptor::default());
    db
}

pub fn db_with_folders(db_id: &str, folders: &[&str]) -> DbEntity {
    let mut db = empty_db(db_id);
    for folder in folders {
        db.folders
            .insert((*folder).to_string(), FolderDescriptor::default());
    }
    db
}

pub fn store_with_file(path: &str, descriptor: FileDescriptor) -> DbStore {
    DbStore {
        files: BTreeMap::from([(path.to_string(), descriptor)]),
        ..DbStore::default()
    }
}

pub fn store_with_file_a() -> DbStore {
    DbStore {
        files: BTreeMap::from([(FILE_A.to_string(), file_a_descr())]),
        folders: BTreeMap::from([(FOLDER_A.to_string(), FolderDescriptor::default())]),
        ..DbStore::default()
    }
}

pub fn store_with_folders(folders: &[&str]) -> DbStore {
    DbStore {
        folders: folders
            .iter()
            .map(|folder| ((*folder).to_string(), FolderDescriptor::default()))
            .collect(),
        ..DbStore::default()
    }
}

/// An online importer wired to the in-memory filesystem and the scripted
/// downloader, holding the command whose store slices the test asserts on
pub struct OnlineImporterTestBed {
    pub file_system: Arc<InMemoryFileSystem>,
    pub downloader_factory: Arc<FakeDownloaderFactory>,
    pub command: ImporterCommand,
}

impl OnlineImporterTestBed {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let file_system = InMemoryFileSystem::with_config(&config);
        let downloader_factory = FakeDownloaderFactory::new(Arc::clone(&file_system));
        Self {
            file_system,
            downloader_factory,
            command: ImporterCommand::new(config),
        }
    }

    pub fn add_db(&mut self, db: DbEntity, store: DbStore) -> &mut Self {
        self.command.add_db(db, store, None);
        self
    }

    pub fn download(&mut self, full_resync: bool) -> OnlineImporter {
        let file_system: Arc<dyn mister_downloader::FileSystem> = self.file_system.clone();
        let factory: Arc<dyn mister_downloader::downloader::FileDownloaderFactory> =
            self.downloader_factory.clone();
        let mut importer = OnlineImporter::new(file_system, factory);
        importer
            .download_dbs_contents(&mut self.command, full_resync)
            .unwrap();
        importer
    }

    pub fn store(&self, index: usize) -> &DbStore {
        &self.command.parts()[index].store
    }
}

/// Same wiring for the offline importer
pub struct OfflineImporterTestBed {
    pub file_system: Arc<InMemoryFileSystem>,
    pub downloader_factory: Arc<FakeDownloaderFactory>,
    pub command: ImporterCommand,
}

impl OfflineImporterTestBed {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let file_system = InMemoryFileSystem::with_config(&config);
        let downloader_factory = FakeDownloaderFactory::new(Arc::clone(&file_system));
        Self {
            file_system,
            downloader_factory,
            command: ImporterCommand::new(config),
        }
    }

    pub fn add_db(&mut self, db: DbEntity, store: DbStore) -> &mut Self {
        self.command.add_db(db, store, None);
        self
    }

    pub fn apply(&mut self) {
        let file_system: Arc<dyn mister_downloader::FileSystem> = self.file_system.clone();
        let factory: Arc<dyn mister_downloader::downloader::FileDownloaderFactory> =
            self.downloader_factory.clone();
        let importer = OfflineImporter::new(file_system, factory);
        importer
            .apply_offline_databases(&mut self.command)
            .unwrap();
    }

    pub fn store(&self, index: usize) -> &DbStore {
        &self.command.parts()[index].store
    }
}
