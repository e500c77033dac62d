// src/config/reader.rs

//! INI and environment loading
//!
//! The INI is parsed with the `config` crate and then validated into the
//! typed [`Config`]. Section order is recovered from the file text because
//! the reconcile engine processes databases in declaration order.

use super::{AllowDelete, AllowReboot, Config, DbOptions, Description, Env, UpdateLinuxEnv};
use crate::constants::{DISTRIBUTION_MISTER_DB_ID, DISTRIBUTION_MISTER_DB_URL};
use crate::error::{Error, Result};
use config::FileFormat;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

const MAIN_SECTION: &str = "mister";

/// Read the INI at `path` into a validated [`Config`].
///
/// A missing file yields the defaults (including the injected
/// `distribution_mister` database). A malformed file or an invalid parameter
/// is an error.
pub fn read_config(path: &str) -> Result<Config> {
    let mut config = Config {
        config_path: path.to_string(),
        ..Config::default()
    };

    if !Path::new(path).is_file() {
        debug!("No INI file at {}, using defaults", path);
        config.databases = Config::default_databases();
        return Ok(config);
    }

    let sections = load_ini_sections(path)?;
    let order = section_order(path)?;

    // an empty section may not survive the INI parser, but it still means
    // something for database sections, so fall back to an empty key set
    let no_keys = HashMap::new();
    let mut databases: Vec<Description> = Vec::new();
    for section in &order {
        let keys = sections.get(section).unwrap_or(&no_keys);
        if section == MAIN_SECTION {
            apply_main_section(&mut config, keys)?;
        } else {
            databases.push(read_database_section(section, keys)?);
        }
    }

    if databases.iter().filter(|d| d.section == DISTRIBUTION_MISTER_DB_ID).count() > 1 {
        return Err(Error::InvalidConfigParameter(format!(
            "database section '{DISTRIBUTION_MISTER_DB_ID}' is declared more than once"
        )));
    }

    if databases.is_empty() {
        databases = Config::default_databases();
    }

    config.databases = databases;
    Ok(config)
}

/// Read the environment variables the tool honors
pub fn read_env() -> Result<Env> {
    let update_linux = match std::env::var("UPDATE_LINUX") {
        Err(_) => UpdateLinuxEnv::True,
        Ok(value) => match value.to_lowercase().as_str() {
            "true" => UpdateLinuxEnv::True,
            "false" => UpdateLinuxEnv::False,
            "only" => UpdateLinuxEnv::Only,
            other => {
                return Err(Error::InvalidConfigParameter(format!(
                    "UPDATE_LINUX must be one of true, false, only; got '{other}'"
                )));
            }
        },
    };

    let fail_on_file_error = std::env::var("FAIL_ON_FILE_ERROR")
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false);

    let commit = std::env::var("COMMIT").unwrap_or_else(|_| "unknown".to_string());

    Ok(Env {
        update_linux,
        fail_on_file_error,
        commit,
    })
}

fn load_ini_sections(path: &str) -> Result<HashMap<String, HashMap<String, String>>> {
    let settings = config::Config::builder()
        .add_source(config::File::from(Path::new(path).to_path_buf()).format(FileFormat::Ini))
        .build()
        .map_err(|e| Error::InvalidConfigParameter(format!("could not read INI {path}: {e}")))?;

    let raw: HashMap<String, HashMap<String, String>> = settings
        .try_deserialize()
        .map_err(|e| Error::InvalidConfigParameter(format!("malformed INI {path}: {e}")))?;

    let mut sections = HashMap::new();
    for (section, keys) in raw {
        let mut normalized = HashMap::new();
        for (key, value) in keys {
            normalized.insert(key.to_lowercase(), unquote(&value));
        }
        sections.insert(section.to_lowercase(), normalized);
    }
    Ok(sections)
}

/// Section headers in file order, lowercased and deduplicated
fn section_order(path: &str) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("could not read INI {path}: {e}")))?;

    let header = Regex::new(r"^\s*\[([^\]]+)\]").map_err(|e| Error::ParseError(e.to_string()))?;

    let mut order = Vec::new();
    for line in contents.lines() {
        if let Some(captures) = header.captures(line) {
            let section = captures[1].trim().to_lowercase();
            if !order.contains(&section) {
                order.push(section);
            }
        }
    }
    Ok(order)
}

fn apply_main_section(config: &mut Config, keys: &HashMap<String, String>) -> Result<()> {
    for (key, value) in keys {
        match key.as_str() {
            "base_path" => config.base_path = parse_base_path(key, value)?,
            "base_system_path" => config.base_system_path = parse_base_path(key, value)?,
            "allow_delete" => config.allow_delete = value.parse::<AllowDelete>()?,
            "allow_reboot" => config.allow_reboot = value.parse::<AllowReboot>()?,
            "update_linux" => config.update_linux = parse_bool(key, value)?,
            "parallel_update" => config.parallel_update = parse_bool(key, value)?,
            "check_manually_deleted_files" => {
                config.check_manually_deleted_files = parse_bool(key, value)?;
            }
            "downloader_size_mb_limit" => {
                config.downloader_size_mb_limit = parse_number(key, value)?;
            }
            "downloader_process_limit" => {
                config.downloader_process_limit = parse_number(key, value)?;
            }
            "downloader_timeout" => config.downloader_timeout = parse_number(key, value)?,
            "downloader_retries" => config.downloader_retries = parse_number(key, value)?,
            "zip_file_count_threshold" => {
                config.zip_file_count_threshold = parse_number(key, value)?;
            }
            "filter" => config.filter = Some(value.clone()),
            "verbose" => config.verbose = parse_bool(key, value)?,
            other => {
                warn!("Ignoring unknown [{}] key '{}'", MAIN_SECTION, other);
                continue;
            }
        }
        config.user_defined_options.insert(key.clone());
    }
    Ok(())
}

fn read_database_section(section: &str, keys: &HashMap<String, String>) -> Result<Description> {
    let db_url = match keys.get("db_url") {
        Some(url) => url.clone(),
        None if section == DISTRIBUTION_MISTER_DB_ID => DISTRIBUTION_MISTER_DB_URL.to_string(),
        None => {
            return Err(Error::InvalidConfigParameter(format!(
                "database section '{section}' is missing db_url"
            )));
        }
    };

    let mut options = DbOptions::default();
    let mut any_option = false;
    for (key, value) in keys {
        match key.as_str() {
            "db_url" => continue,
            "filter" => options.filter = Some(value.clone()),
            "parallel_update" => options.parallel_update = Some(parse_bool(key, value)?),
            "update_linux" => options.update_linux = Some(parse_bool(key, value)?),
            "downloader_size_mb_limit" => {
                options.downloader_size_mb_limit = Some(parse_number(key, value)?);
            }
            "downloader_process_limit" => {
                options.downloader_process_limit = Some(parse_number(key, value)?);
            }
            "downloader_timeout" => options.downloader_timeout = Some(parse_number(key, value)?),
            "downloader_retries" => options.downloader_retries = Some(parse_number(key, value)?),
            other => {
                warn!("Ignoring unknown [{}] key '{}'", section, other);
                continue;
            }
        }
        any_option = true;
    }

    Ok(Description {
        db_url,
        section: section.to_string(),
        options: any_option.then_some(options),
    })
}

fn parse_base_path(key: &str, value: &str) -> Result<String> {
    if !value.starts_with('/') {
        return Err(Error::InvalidConfigParameter(format!(
            "{key} must be an absolute path; got '{value}'"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(Error::InvalidConfigParameter(format!(
            "{key} must be a boolean; got '{value}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        Error::InvalidConfigParameter(format!("{key} must be a number; got '{value}'"))
    })
}

fn unquote(value: &str) -> String {
    let trimmed = value.trim();
    let stripped = trimmed
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(trimmed).to_string()
}
