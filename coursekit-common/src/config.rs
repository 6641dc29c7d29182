//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the shared config file looked up under the platform config dir
const SHARED_CONFIG_FILE: &str = "config.toml";

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` key of the shared TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(cli_arg: Option<&Path>, env_var_name: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!("Root folder from command line: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!("Root folder from {}: {}", env_var_name, path);
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = shared_config_path().filter(|p| p.exists()) {
        if let Ok(content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    debug!("Root folder from {}", config_path.display());
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    default_root_folder()
}

/// Path of the shared config file (`~/.config/coursekit/config.toml` on Linux)
pub fn shared_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("coursekit").join(SHARED_CONFIG_FILE))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("coursekit"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\coursekit"))
    } else if cfg!(any(target_os = "linux", target_os = "macos")) {
        dirs::data_local_dir()
            .map(|d| d.join("coursekit"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/coursekit"))
    } else {
        PathBuf::from("./coursekit_data")
    }
}

/// Create the root folder if missing and return the database path inside it
pub fn ensure_root_folder(root_folder: &Path, db_file_name: &str) -> Result<PathBuf> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        info!("Created root folder: {}", root_folder.display());
    }
    if !root_folder.is_dir() {
        return Err(Error::Config(format!(
            "Root folder is not a directory: {}",
            root_folder.display()
        )));
    }
    Ok(root_folder.join(db_file_name))
}

/// Load a TOML config file into `T`
///
/// A missing file yields `T::default()`; a file that exists but fails to
/// read or parse is a configuration error.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        debug!("Config file not found, using defaults: {}", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Read an environment variable and parse it, ignoring unset or blank values
pub fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", name, e))),
        _ => Ok(None),
    }
}
