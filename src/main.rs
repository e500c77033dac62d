// src/main.rs

use anyhow::Result;
use clap::Parser;
use mister_downloader::constants::DEFAULT_INI_PATH;
use mister_downloader::downloader::HttpDownloaderFactory;
use mister_downloader::{config, FullRunService, ProductionFileSystem};
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "mister-downloader")]
#[command(author, version, about = "Keeps a MiSTer SD card in sync with its databases", long_about = None)]
struct Cli {
    /// Path to the downloader INI file
    #[arg(long, default_value = DEFAULT_INI_PATH)]
    ini: String,
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(&cli.ini));
}

fn run(ini_path: &str) -> i32 {
    let config = match config::read_config(ini_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return 1;
        }
    };

    let default_filter = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match run_service(config) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Run failed: {e}");
            1
        }
    }
}

fn run_service(config: mister_downloader::Config) -> Result<i32> {
    let env = config::read_env()?;
    let file_system = Arc::new(ProductionFileSystem::new(&config));
    let downloader_factory = Arc::new(HttpDownloaderFactory::new(file_system.clone()));

    let mut service = FullRunService::new(env, config, file_system, downloader_factory);
    let exit_code = service.full_run()?;

    if service.needs_reboot()? {
        println!("Rebooting in 10 seconds...");
        std::thread::sleep(std::time::Duration::from_secs(10));
        debug!("Rebooting now");
        let _ = std::process::Command::new("sh")
            .arg("-c")
            .arg("sync; reboot now")
            .status();
    }

    Ok(exit_code)
}
