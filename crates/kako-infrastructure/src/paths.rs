//! Unified path management for kako configuration files.
//!
//! Every file the client reads lives under one directory so that a single
//! override (`KAKO_CONFIG_DIR`) relocates all of them, e.g. in tests.

use std::path::PathBuf;

/// Overrides the configuration directory.
pub const CONFIG_DIR_ENV: &str = "KAKO_CONFIG_DIR";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified path management for kako.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/kako/              # Config directory
/// ├── config.toml              # Client configuration
/// └── secret.json              # Auth token for the dashboard backend
/// ```
pub struct KakoPaths;

impl KakoPaths {
    /// Returns the kako configuration directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: `$KAKO_CONFIG_DIR`, or `~/.config/kako/`
    /// - `Err(PathError::HomeDirNotFound)`: Could not determine directory
    pub fn config_dir() -> Result<PathBuf, PathError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::home_dir()
            .map(|home| home.join(".config").join("kako"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the path to the secrets file.
    ///
    /// # Security Note
    ///
    /// Ensure this file has appropriate permissions (e.g., 600) to prevent
    /// unauthorized access.
    pub fn secret_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("secret.json"))
    }
}
