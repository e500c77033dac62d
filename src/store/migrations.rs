// src/store/migrations.rs

//! Store schema migrations
//!
//! Migrations run over the raw JSON document, strictly increasing from the
//! stored version to [`LATEST_STORE_VERSION`], each mutating in place and
//! bumping the version. A missing store is synthesized empty at version 0
//! and migrated forward like any other.

use super::LocalStore;
use crate::constants::DISTRIBUTION_MISTER_DB_ID;
use crate::error::{Error, Result};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Terminal schema version the migrations below produce
pub const LATEST_STORE_VERSION: u32 = 3;

type Migration = fn(&mut Value) -> Result<()>;

const MIGRATIONS: [(u32, Migration); 3] = [
    (1, migrate_v1),
    (2, migrate_v2),
    (3, migrate_v3),
];

/// Applies the ordered migration list to a loaded store document
pub struct StoreMigrator;

impl StoreMigrator {
    pub fn new() -> Self {
        Self
    }

    /// Migrate `value` to the terminal version and decode it.
    ///
    /// A store newer than this binary understands is an error rather than a
    /// silent downgrade.
    pub fn migrate(&self, mut value: Value) -> Result<LocalStore> {
        let current = value
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;

        if current > LATEST_STORE_VERSION {
            return Err(Error::StoreError(format!(
                "store version {current} is newer than supported version {LATEST_STORE_VERSION}"
            )));
        }

        for (target, migration) in MIGRATIONS {
            if target <= current {
                continue;
            }
            debug!("Migrating store to version {}", target);
            migration(&mut value)?;
            value["version"] = json!(target);
        }

        if current < LATEST_STORE_VERSION {
            info!("Store migrated from version {} to {}", current, LATEST_STORE_VERSION);
        }

        serde_json::from_value(value)
            .map_err(|e| Error::StoreError(format!("migrated store does not decode: {e}")))
    }

    /// An empty store, already at the terminal version
    pub fn empty(&self) -> LocalStore {
        LocalStore::new()
    }
}

impl Default for StoreMigrator {
    fn default() -> Self {
        Self::new()
    }
}

fn object<'a>(value: &'a mut Value, context: &str) -> Result<&'a mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| Error::StoreError(format!("{context} is not a JSON object")))
}

/// Version 1: the original flat `{files, folders}` document becomes a
/// per-database `dbs` mapping. A flat store could only belong to the
/// distribution database.
fn migrate_v1(value: &mut Value) -> Result<()> {
    let root = object(value, "store")?;
    if root.contains_key("dbs") {
        return Ok(());
    }

    let files = root.remove("files").unwrap_or_else(|| json!({}));
    let folders = root.remove("folders").unwrap_or_else(|| json!([]));

    root.insert(
        "dbs".to_string(),
        json!({
            DISTRIBUTION_MISTER_DB_ID: {"files": files, "folders": folders}
        }),
    );
    Ok(())
}

/// Version 2: folder lists become path → descriptor mappings
fn migrate_v2(value: &mut Value) -> Result<()> {
    let root = object(value, "store")?;
    let Some(dbs) = root.get_mut("dbs").and_then(Value::as_object_mut) else {
        return Ok(());
    };

    for (db_id, db_store) in dbs {
        let db_store = object(db_store, db_id)?;
        let Some(folders) = db_store.get("folders") else {
            continue;
        };
        if let Some(list) = folders.as_array() {
            let mut mapping = Map::new();
            for folder in list {
                if let Some(path) = folder.as_str() {
                    mapping.insert(path.to_string(), json!({}));
                }
            }
            db_store.insert("folders".to_string(), Value::Object(mapping));
        }
    }
    Ok(())
}

/// Version 3: every database slice gains the offline-import ledger and the
/// zip bookkeeping slots
fn migrate_v3(value: &mut Value) -> Result<()> {
    let root = object(value, "store")?;
    let Some(dbs) = root.get_mut("dbs").and_then(Value::as_object_mut) else {
        return Ok(());
    };

    for (db_id, db_store) in dbs {
        let db_store = object(db_store, db_id)?;
        db_store
            .entry("offline_databases_imported")
            .or_insert_with(|| json!([]));
        db_store.entry("zips").or_insert_with(|| json!({}));
    }
    Ok(())
}
