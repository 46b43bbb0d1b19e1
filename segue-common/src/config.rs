//! Configuration file discovery and TOML loading
//!
//! Resolution follows a fixed priority order:
//! 1. Explicit path (command-line argument)
//! 2. Environment variable
//! 3. Per-user config file (`<config_dir>/<app>/config.toml`)
//! 4. System config file (`/etc/<app>/config.toml`, Linux only)
//!
//! A missing config file is never fatal; callers fall back to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locate the configuration file for `app`
///
/// Returns `None` when no candidate exists. An explicit path or environment
/// variable is returned even if the file does not exist, so that the caller
/// reports the user's mistake instead of silently using defaults.
pub fn locate_config_file(explicit: Option<&Path>, env_var: &str, app: &str) -> Option<PathBuf> {
    // Priority 1: explicit path
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(env_var) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config
    if let Some(user_config) = dirs::config_dir().map(|d| d.join(app).join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: system-wide config
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(app).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Locate and parse the configuration, falling back to `T::default()`
///
/// An explicitly requested file that cannot be read or parsed is an error.
/// A missing discovered file only logs a debug line.
pub fn load_or_default<T>(explicit: Option<&Path>, env_var: &str, app: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match locate_config_file(explicit, env_var, app) {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            load_toml(&path)
        }
        None => {
            debug!(app, "No config file found, using defaults");
            Ok(T::default())
        }
    }
}
