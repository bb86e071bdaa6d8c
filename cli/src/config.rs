//! Configuration loading and persistence.
//!
//! Reads `config.json` from the config directory and applies
//! `SOCKET_BRIDGE_*` environment overrides on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::Path, path::PathBuf};

use crate::connection::Endpoint;
use crate::constants;

/// Configuration for the socket bridge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Bound on establishing a connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Deadline for `get` when the caller gives none, in milliseconds.
    pub default_get_timeout_ms: u64,
    /// Deadline for `put`'s initial exchange and `putAnswer`'s reply, in milliseconds.
    pub exchange_timeout_ms: u64,
    /// How long `connectAndStart` waits for a reply datagram, in milliseconds.
    pub udp_receive_timeout_ms: u64,
    /// Maximum bytes taken by a single response read.
    pub read_buffer_size: usize,
    /// Default route for `query`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Endpoint>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout_ms: constants::CONNECT_TIMEOUT.as_millis() as u64,
            default_get_timeout_ms: constants::DEFAULT_GET_TIMEOUT.as_millis() as u64,
            exchange_timeout_ms: constants::EXCHANGE_TIMEOUT.as_millis() as u64,
            udp_receive_timeout_ms: constants::UDP_RECEIVE_TIMEOUT.as_millis() as u64,
            read_buffer_size: constants::READ_BUFFER_SIZE,
            route: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `SOCKET_BRIDGE_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("SOCKET_BRIDGE_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("socket-bridge")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path` without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {} as JSON", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        fn parsed<T: std::str::FromStr>(var: &str) -> Option<T>
        where
            T::Err: std::fmt::Display,
        {
            let raw = std::env::var(var).ok()?;
            match raw.parse::<T>() {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("Ignoring {var}={raw}: {e}");
                    None
                }
            }
        }

        if let Some(ms) = parsed("SOCKET_BRIDGE_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = ms;
        }
        if let Some(ms) = parsed("SOCKET_BRIDGE_GET_TIMEOUT_MS") {
            self.default_get_timeout_ms = ms;
        }
        if let Some(ms) = parsed("SOCKET_BRIDGE_EXCHANGE_TIMEOUT_MS") {
            self.exchange_timeout_ms = ms;
        }
        if let Some(ms) = parsed("SOCKET_BRIDGE_UDP_TIMEOUT_MS") {
            self.udp_receive_timeout_ms = ms;
        }
        if let Some(size) = parsed("SOCKET_BRIDGE_READ_BUFFER_SIZE") {
            self.read_buffer_size = size;
        }
        if let Some(route) = parsed::<Endpoint>("SOCKET_BRIDGE_ROUTE") {
            self.route = Some(route);
        }
    }

    /// Checks that buffer size and timeouts are usable.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            anyhow::bail!("read_buffer_size must be greater than zero");
        }
        for (field, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("default_get_timeout_ms", self.default_get_timeout_ms),
            ("exchange_timeout_ms", self.exchange_timeout_ms),
            ("udp_receive_timeout_ms", self.udp_receive_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{field} must be greater than zero");
            }
        }
        Ok(())
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?.join("config.json"))
    }

    /// Persists the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Default `get` deadline as a `Duration`.
    pub fn default_get_timeout(&self) -> Duration {
        Duration::from_millis(self.default_get_timeout_ms)
    }

    /// Exchange deadline as a `Duration`.
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }

    /// UDP receive deadline as a `Duration`.
    pub fn udp_receive_timeout(&self) -> Duration {
        Duration::from_millis(self.udp_receive_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connect_timeout_ms, 5000);
        assert_eq!(config.default_get_timeout_ms, 1000);
        assert_eq!(config.udp_receive_timeout(), Duration::from_millis(2000));
        assert_eq!(config.read_buffer_size, 2000);
        assert!(config.route.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{"read_buffer_size": 512, "route": {"host": "localhost", "port": 6363}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.read_buffer_size, 512);
        assert_eq!(config.route, Some(Endpoint::new("localhost", 6363)));
        assert_eq!(config.exchange_timeout_ms, 10_000);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        let mut config = Config::default();
        config.udp_receive_timeout_ms = 750;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.read_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.exchange_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
