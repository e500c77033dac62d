// src/full_run.rs

//! One complete run of the tool
//!
//! load store → fetch databases → offline import → online reconcile →
//! save store → linux update → reboot decision. Partial results are always
//! persisted; per-database failures only affect the exit code.

use crate::config::{Config, Env, UpdateLinuxEnv};
use crate::db::DbGateway;
use crate::downloader::FileDownloaderFactory;
use crate::error::Result;
use crate::filesystem::FileSystem;
use crate::importer::{ImporterCommand, OfflineImporter, OnlineImporter};
use crate::linux_updater::LinuxUpdater;
use crate::reboot_calculator::RebootCalculator;
use crate::store::{LocalRepository, StoreMigrator};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct FullRunService {
    env: Env,
    config: Config,
    local_repository: LocalRepository,
    store_migrator: StoreMigrator,
    db_gateway: DbGateway,
    offline_importer: OfflineImporter,
    online_importer: OnlineImporter,
    linux_updater: LinuxUpdater,
    reboot_calculator: RebootCalculator,
}

impl FullRunService {
    pub fn new(
        env: Env,
        config: Config,
        file_system: Arc<dyn FileSystem>,
        downloader_factory: Arc<dyn FileDownloaderFactory>,
    ) -> Self {
        Self {
            local_repository: LocalRepository::new(&config, Arc::clone(&file_system)),
            store_migrator: StoreMigrator::new(),
            db_gateway: DbGateway::new(Arc::clone(&file_system), Arc::clone(&downloader_factory)),
            offline_importer: OfflineImporter::new(
                Arc::clone(&file_system),
                Arc::clone(&downloader_factory),
            ),
            online_importer: OnlineImporter::new(
                Arc::clone(&file_system),
                Arc::clone(&downloader_factory),
            ),
            linux_updater: LinuxUpdater::new(
                config.clone(),
                Arc::clone(&file_system),
                Arc::clone(&downloader_factory),
            ),
            reboot_calculator: RebootCalculator::new(config.clone(), file_system),
            env,
            config,
        }
    }

    /// Run to completion. Returns the process exit code.
    pub fn full_run(&mut self) -> Result<i32> {
        let start = Instant::now();
        debug!("env: {:?}", self.env);
        debug!("config: {:?}", self.config);

        let mut local_store = self.local_repository.load_store(&self.store_migrator);

        let (databases, failed_dbs) = self.db_gateway.fetch_all(&self.config);

        let mut command = ImporterCommand::new(self.config.clone());
        for db in databases {
            let store = local_store.dbs.remove(&db.db_id).unwrap_or_default();
            let options = self
                .config
                .description_for(&db.db_id)
                .and_then(|description| description.options.clone());
            command.add_db(db, store, options.as_ref());
        }

        let update_only_linux = self.env.update_linux == UpdateLinuxEnv::Only;
        let update_linux =
            self.env.update_linux != UpdateLinuxEnv::False && self.config.update_linux;

        let mut import_error = None;
        if !update_only_linux {
            let full_resync = !self.local_repository.has_last_successful_run();
            let result = self
                .offline_importer
                .apply_offline_databases(&mut command)
                .and_then(|()| {
                    self.online_importer
                        .download_dbs_contents(&mut command, full_resync)
                });
            if let Err(e) = result {
                import_error = Some(e);
            }
        }

        // partial results are always persisted, even on a fatal error
        for part in command.parts() {
            local_store
                .dbs
                .insert(part.db.db_id.clone(), part.store.clone());
        }
        self.local_repository.save_store(&local_store)?;

        if let Some(e) = import_error {
            return Err(e);
        }
        self.local_repository.mark_successful_run()?;

        if !update_only_linux {
            let mut failed = self.online_importer.files_that_failed().to_vec();
            failed.extend(failed_dbs.iter().cloned());
            failed.extend(self.online_importer.dbs_that_failed().iter().cloned());
            self.display_summary(
                self.online_importer.correctly_installed_files(),
                &failed,
                &self.online_importer.unused_filter_terms(),
                self.online_importer.new_files_not_overwritten(),
                start,
            );
        }

        println!();

        if update_linux {
            self.linux_updater.update_linux(&command)?;

            if update_only_linux && !self.linux_updater.needs_reboot() {
                println!("Linux is already on the latest version.\n");
            }
        } else if update_only_linux {
            println!("update_linux is set to false, skipping...\n");
        }

        if self.env.fail_on_file_error && !self.online_importer.files_that_failed().is_empty() {
            debug!(
                "Failed files: {}",
                self.online_importer.files_that_failed().len()
            );
            return Ok(1);
        }

        if !failed_dbs.is_empty() || !self.online_importer.dbs_that_failed().is_empty() {
            debug!("Failed dbs: {}", failed_dbs.len());
            return Ok(1);
        }

        Ok(0)
    }

    /// Whether the device should be rebooted right now
    pub fn needs_reboot(&self) -> Result<bool> {
        self.reboot_calculator.calc_needs_reboot(
            self.linux_updater.needs_reboot(),
            self.online_importer.needs_reboot(),
        )
    }

    fn display_summary(
        &self,
        installed: &[String],
        failed: &[String],
        unused_filter_terms: &[String],
        not_overwritten: &BTreeMap<String, Vec<String>>,
        start: Instant,
    ) {
        println!();
        println!("===========================");
        println!(
            "Downloader {} ({}). Run time: {:.1}s",
            env!("CARGO_PKG_VERSION"),
            self.env.commit,
            start.elapsed().as_secs_f32()
        );
        println!("Log: {}", self.local_repository.logfile_path());

        if !unused_filter_terms.is_empty() {
            println!();
            println!("Unused filter terms:");
            let hint = if unused_filter_terms.len() == 1 {
                "(Did you misspell it?)"
            } else {
                "(Did you misspell them?)"
            };
            println!("{} {hint}", format_files_message(unused_filter_terms));
        }

        println!();
        println!("Installed:");
        println!("{}", format_files_message(installed));
        println!();
        println!("Errors:");
        println!("{}", format_files_message(failed));

        if not_overwritten.is_empty() {
            return;
        }

        println!();
        println!("Not installed due to overwrite protection:");
        for (db_id, paths) in not_overwritten {
            println!(" •{db_id}: {}", paths.join(", "));
        }
        println!();
        println!(" * Delete any protected file that you wish to install, and run this again.");
    }
}

fn format_files_message(files: &[String]) -> String {
    if files.is_empty() {
        "none.".to_string()
    } else {
        files.join(", ")
    }
}
