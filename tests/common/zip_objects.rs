// tests/common/zip_objects.rs

//! Fixtures for the zipped cheats-folder database used by the filter and
//! zip tests.

use super::objects::empty_db;
use super::FakeFile;
use mister_downloader::db::{
    DbEntity, FileDescriptor, FolderDescriptor, ZipDescriptor, ZipKind, ZipSummary,
};
use std::collections::BTreeMap;

pub const CHEATS_ZIP_ID: &str = "cheats_folder";
pub const CHEATS_FOLDER_NAME: &str = "Cheats";
pub const CHEATS_NES_FOLDER_NAME: &str = "Cheats/NES";
pub const CHEATS_NES_FILE_PATH: &str = "Cheats/NES/10-Yard Fight (USA, Europe) [3D564757].zip";
pub const CHEATS_NES_FILE_HASH: &str = "8c02595fef1096a9dd160e59067f4f4a";
pub const CHEATS_NES_FILE_SIZE: u64 = 1020;
pub const CHEATS_SMS_FOLDER_NAME: &str = "Cheats/SMS";
pub const CHEATS_SMS_FILE_PATH: &str = "Cheats/SMS/Sonic The Hedgehog (World).zip";
pub const CHEATS_SMS_FILE_HASH: &str = "1c111111111096a9dd160e59067f4f4a";
pub const CHEATS_SMS_FILE_SIZE: u64 = 2048;

pub const SUMMARY_URL: &str = "https://fake.com/cheats_folder.json.zip";
pub const CONTENTS_URL: &str = "https://fake.com/cheats_folder.zip";

const TAG_CHEATS: u32 = 0;
const TAG_NES: u32 = 1;
const TAG_SMS: u32 = 2;

pub fn cheats_tag_dictionary() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("cheats".to_string(), TAG_CHEATS),
        ("nes".to_string(), TAG_NES),
        ("sms".to_string(), TAG_SMS),
    ])
}

fn zip_file_descr(
    url: Option<&str>,
    hash: &str,
    size: u64,
    tags: &[u32],
    zip_id: bool,
) -> FileDescriptor {
    FileDescriptor {
        url: url.map(str::to_string),
        hash: hash.to_string(),
        size,
        zip_id: zip_id.then(|| CHEATS_ZIP_ID.to_string()),
        tags: Some(tags.to_vec()),
        delete: None,
        overwrite: None,
        reboot: None,
    }
}

pub fn nes_file_descr(url: bool, zip_id: bool, tags: bool) -> FileDescriptor {
    let mut descriptor = zip_file_descr(
        url.then_some("https://fake.com/cheats/nes.zip"),
        CHEATS_NES_FILE_HASH,
        CHEATS_NES_FILE_SIZE,
        &[TAG_CHEATS, TAG_NES],
        zip_id,
    );
    if !tags {
        descriptor.tags = None;
    }
    descriptor
}

pub fn sms_file_descr(url: bool, zip_id: bool, tags: bool) -> FileDescriptor {
    let mut descriptor = zip_file_descr(
        url.then_some("https://fake.com/cheats/sms.zip"),
        CHEATS_SMS_FILE_HASH,
        CHEATS_SMS_FILE_SIZE,
        &[TAG_CHEATS, TAG_SMS],
        zip_id,
    );
    if !tags {
        descriptor.tags = None;
    }
    descriptor
}

fn zip_folder_descr(tags: &[u32], zip_id: bool) -> FolderDescriptor {
    FolderDescriptor {
        zip_id: zip_id.then(|| CHEATS_ZIP_ID.to_string()),
        tags: Some(tags.to_vec()),
    }
}

pub fn cheats_folder_descr() -> FolderDescriptor {
    zip_folder_descr(&[TAG_CHEATS], true)
}

pub fn nes_folder_descr() -> FolderDescriptor {
    zip_folder_descr(&[TAG_CHEATS, TAG_NES], true)
}

pub fn sms_folder_descr() -> FolderDescriptor {
    zip_folder_descr(&[TAG_CHEATS, TAG_SMS], true)
}

/// The cheat files as a database would declare them directly (no zip)
pub fn cheats_files_without_zip() -> BTreeMap<String, FileDescriptor> {
    BTreeMap::from([
        (CHEATS_NES_FILE_PATH.to_string(), nes_file_descr(true, false, true)),
        (CHEATS_SMS_FILE_PATH.to_string(), sms_file_descr(true, false, true)),
    ])
}

pub fn cheats_folders_without_zip() -> BTreeMap<String, FolderDescriptor> {
    BTreeMap::from([
        (CHEATS_FOLDER_NAME.to_string(), zip_folder_descr(&[TAG_CHEATS], false)),
        (CHEATS_NES_FOLDER_NAME.to_string(), zip_folder_descr(&[TAG_CHEATS, TAG_NES], false)),
        (CHEATS_SMS_FOLDER_NAME.to_string(), zip_folder_descr(&[TAG_CHEATS, TAG_SMS], false)),
    ])
}

/// The summary manifest the zip advertises
pub fn cheats_summary() -> ZipSummary {
    ZipSummary {
        files: BTreeMap::from([
            (CHEATS_NES_FILE_PATH.to_string(), nes_file_descr(true, true, true)),
            (CHEATS_SMS_FILE_PATH.to_string(), sms_file_descr(true, true, true)),
        ]),
        folders: BTreeMap::from([
            (CHEATS_FOLDER_NAME.to_string(), cheats_folder_descr()),
            (CHEATS_NES_FOLDER_NAME.to_string(), nes_folder_descr()),
            (CHEATS_SMS_FOLDER_NAME.to_string(), sms_folder_descr()),
        ]),
    }
}

pub fn cheats_zip_descr() -> ZipDescriptor {
    ZipDescriptor {
        summary_file: FileDescriptor::new(SUMMARY_URL, "summary_hash", 300),
        contents_file: FileDescriptor::new(CONTENTS_URL, "contents_hash", 4096),
        kind: ZipKind::ExtractAllContents,
        description: "the cheats folder".to_string(),
        raw_files_size: Some(CHEATS_NES_FILE_SIZE + CHEATS_SMS_FILE_SIZE),
        target_folder_path: Some(CHEATS_FOLDER_NAME.to_string()),
        internal_summary: None,
    }
}

/// A database carrying the cheats zip
pub fn db_test_with_cheats_zip() -> DbEntity {
    let mut db = empty_db("test");
    db.zips.insert(CHEATS_ZIP_ID.to_string(), cheats_zip_descr());
    db.tag_dictionary = Some(cheats_tag_dictionary());
    db
}

/// What extracting the contents archive produces on disk
pub fn zipped_cheats_contents() -> (Vec<(String, FakeFile)>, Vec<String>) {
    (
        vec![
            (
                CHEATS_NES_FILE_PATH.to_string(),
                FakeFile::with_hash(CHEATS_NES_FILE_HASH, CHEATS_NES_FILE_SIZE),
            ),
            (
                CHEATS_SMS_FILE_PATH.to_string(),
                FakeFile::with_hash(CHEATS_SMS_FILE_HASH, CHEATS_SMS_FILE_SIZE),
            ),
        ],
        vec![
            CHEATS_FOLDER_NAME.to_string(),
            CHEATS_NES_FOLDER_NAME.to_string(),
            CHEATS_SMS_FOLDER_NAME.to_string(),
        ],
    )
}
