//! Configuration loading and persistence.
//!
//! Settings live in `config.json` inside the config directory and can be
//! overridden per process with `STUDIO_LINK_*` environment variables.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::constants;
use crate::protocol::framing::{DEFAULT_MAX_FRAME_SIZE, TYPE_SIZE};

/// Connection settings for the engine link.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Engine host. The engine only listens on loopback.
    pub host: String,
    /// Engine port.
    pub port: u16,
    /// Largest accepted frame length field, in bytes.
    pub max_frame_size: u32,
    /// Minimum spare space offered to each socket read.
    pub read_chunk_size: usize,
    /// Initial size of the receive arena.
    pub initial_buffer_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_HOST.to_string(),
            port: constants::DEFAULT_PORT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_chunk_size: constants::READ_CHUNK_SIZE,
            initial_buffer_capacity: constants::INITIAL_RECEIVE_CAPACITY,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `STUDIO_LINK_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("STUDIO_LINK_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("studio-link")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_dir() {
            Ok(dir) => Self::load_from_path(&dir.join("config.json")).unwrap_or_else(|e| {
                log::debug!("[Config] Using default config: {e:#}");
                Self::default()
            }),
            Err(e) => {
                log::warn!("[Config] No config directory ({e:#}), using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config as pretty JSON.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("STUDIO_LINK_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("STUDIO_LINK_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(e) => log::warn!("[Config] Ignoring STUDIO_LINK_PORT={port}: {e}"),
            }
        }

        if let Ok(max) = std::env::var("STUDIO_LINK_MAX_FRAME_SIZE") {
            match max.parse() {
                Ok(max) => self.max_frame_size = max,
                Err(e) => log::warn!("[Config] Ignoring STUDIO_LINK_MAX_FRAME_SIZE={max}: {e}"),
            }
        }
    }

    /// Reject settings the codec cannot work with.
    pub fn validate(&self) -> Result<()> {
        if (self.max_frame_size as usize) < TYPE_SIZE {
            bail!(
                "max_frame_size must be at least {TYPE_SIZE} bytes, got {}",
                self.max_frame_size
            );
        }
        if self.max_frame_size > i32::MAX as u32 {
            bail!("max_frame_size {} does not fit the i32 length field", self.max_frame_size);
        }
        if self.read_chunk_size == 0 {
            bail!("read_chunk_size must be positive");
        }
        Ok(())
    }

    /// `host:port` for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.address(), "127.0.0.1:10001");
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/config.json");
        let config = Config {
            port: 12345,
            read_chunk_size: 1024,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(Config::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "port": 4000 }"#).unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.read_chunk_size, constants::READ_CHUNK_SIZE);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "max_frame_size": 2 }"#).unwrap();
        assert!(Config::load_from_path(&path).is_err());

        let config = Config { read_chunk_size: 0, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { max_frame_size: u32::MAX, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(Config::load_from_path(&tmp.path().join("absent.json")).is_err());
    }
}
