// src/importer/mod.rs

//! Importers and the command bundle they consume
//!
//! A run builds one [`ImporterCommand`] out of the fetched databases, their
//! store slices and the per-database effective configuration, then hands it
//! first to the offline importer and then to the online reconcile engine.

mod offline;
mod online;

pub use offline::OfflineImporter;
pub use online::OnlineImporter;

use crate::config::{Config, DbOptions};
use crate::db::DbEntity;
use crate::store::DbStore;

/// One database to process: the manifest, what the store remembers about it,
/// and the configuration in effect for it
pub struct ImporterCommandPart {
    pub db: DbEntity,
    pub store: DbStore,
    pub config: Config,
}

/// The databases of a run, in configuration order.
///
/// Cross-database rules (first-writer-wins, global orphan computation) rely
/// on this order being the INI declaration order.
pub struct ImporterCommand {
    config: Config,
    parts: Vec<ImporterCommandPart>,
}

impl ImporterCommand {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            parts: Vec::new(),
        }
    }

    /// Append a database. The effective config is the global config overlaid
    /// with the manifest's `default_options` (which never beat user-set
    /// keys) and then the INI section options.
    pub fn add_db(&mut self, db: DbEntity, store: DbStore, options: Option<&DbOptions>) {
        let config = self
            .config
            .effective_for(db.default_options.as_ref(), options);
        self.parts.push(ImporterCommandPart { db, store, config });
    }

    pub fn parts(&self) -> &[ImporterCommandPart] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut [ImporterCommandPart] {
        &mut self.parts
    }
}
