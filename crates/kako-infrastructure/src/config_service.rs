//! Configuration service implementation.
//!
//! This module provides a ConfigService that loads the client configuration
//! from the configuration file (~/.config/kako/config.toml).

use crate::paths::KakoPaths;
use kako_core::config::ClientConfig;
use kako_core::{KakoError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Configuration service that loads and caches the client configuration.
///
/// A missing file yields the defaults. A file that exists but does not parse
/// is an error from [`load`](Self::load); [`get_config`](Self::get_config)
/// logs it and falls back to the defaults.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<ClientConfig>>>,
}

impl ConfigService {
    /// Creates a ConfigService reading the default config file.
    pub fn new() -> Self {
        Self {
            path: KakoPaths::config_file().ok(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a ConfigService reading `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> ClientConfig {
        {
            let cached = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(config) = cached.as_ref() {
                return config.clone();
            }
        }

        let loaded = self.load().unwrap_or_else(|e| {
            tracing::warn!("[ConfigService] {}; using defaults", e);
            ClientConfig::default()
        });

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded.clone());
        loaded
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Reads and parses the config file, bypassing the cache.
    pub fn load(&self) -> Result<ClientConfig> {
        let Some(path) = &self.path else {
            tracing::debug!("[ConfigService] No config path, using defaults");
            return Ok(ClientConfig::default());
        };

        if !path.exists() {
            tracing::debug!("[ConfigService] {} not found, using defaults", path.display());
            return Ok(ClientConfig::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&raw).map_err(|e| {
            KakoError::config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        tracing::debug!("[ConfigService] Loaded {}", path.display());
        Ok(config)
    }

    /// Writes `config` to the config file, creating the directory if needed.
    pub fn save(&self, config: &ClientConfig) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| KakoError::config("no configuration path available"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(config)
            .map_err(|e| KakoError::config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, raw)?;

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("config.toml"));
        assert_eq!(service.load().unwrap(), ClientConfig::default());
    }

    #[test]
    fn invalid_file_is_a_config_error_but_get_config_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = [").unwrap();

        let service = ConfigService::with_path(&path);
        assert!(service.load().unwrap_err().is_config());
        assert_eq!(service.get_config(), ClientConfig::default());
    }

    #[test]
    fn save_then_reload() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("nested").join("config.toml"));

        let mut config = ClientConfig::default();
        config.server_url = "https://kako.example.com".to_string();
        config.reconnect.max_attempts = 8;
        service.save(&config).unwrap();

        service.invalidate_cache();
        assert_eq!(service.get_config(), config);
    }
}
