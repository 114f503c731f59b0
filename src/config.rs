//! Configuration management for the liquidd daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that selects the bus, export paths and transport limits.

use anyhow::{Context, Result};
use log::{LevelFilter, info};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use zvariant::ObjectPath;

use crate::hid::HID_MAX_BUFFER_SIZE;

/// Main configuration structure for the liquidd daemon.
///
/// Every field except `version` is optional in the file.
///
/// # Example
///
/// ```yaml
/// version: 1
/// bus: session
/// bus_name: org.liquidctl.LiquidD
/// object_root: /org/liquidctl/LiquidD
/// max_report_size: 16384
/// init_on_start: false
/// log_level: info
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Which message bus to export on.
    #[serde(default)]
    pub bus: BusKind,

    /// Well-known name requested on the bus.
    #[serde(default = "defaults::bus_name")]
    pub bus_name: String,

    /// Object path under which every driver is exported.
    #[serde(default = "defaults::object_root")]
    pub object_root: String,

    /// Largest input report read from a device. Clamped by the transport.
    #[serde(default = "defaults::max_report_size")]
    pub max_report_size: usize,

    /// Send the initialization commands to every device right after probing.
    #[serde(default)]
    pub init_on_start: bool,

    #[serde(default)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

mod defaults {
    pub fn bus_name() -> String {
        String::from("org.liquidctl.LiquidD")
    }

    pub fn object_root() -> String {
        String::from("/org/liquidctl/LiquidD")
    }

    pub fn max_report_size() -> usize {
        super::HID_MAX_BUFFER_SIZE
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            bus: BusKind::default(),
            bus_name: defaults::bus_name(),
            object_root: defaults::object_root(),
            max_report_size: defaults::max_report_size(),
            init_on_start: false,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use liquidd::config::Config;
    ///
    /// let config = Config::default();
    /// config.validate()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported config version {}", self.version);
        }

        if self.bus_name.is_empty() {
            anyhow::bail!("bus_name cannot be empty");
        }

        ObjectPath::try_from(self.object_root.as_str())
            .with_context(|| format!("Invalid object_root '{}'", self.object_root))?;
        if self.object_root == "/" {
            anyhow::bail!("object_root cannot be the bus root");
        }

        Ok(())
    }
}

/// Candidate config files in lookup order.
fn config_candidates(
    env_path: Option<PathBuf>,
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env_path {
        candidates.push(path);
    }

    if let Some(cfg_dir) = xdg_config_home.or_else(|| home.map(|h| h.join(".config"))) {
        candidates.push(cfg_dir.join("liquidd/config.yml"));
    }

    candidates.push(PathBuf::from("/etc/liquidd/config.yml"));
    candidates
}

fn locate_config() -> Option<PathBuf> {
    config_candidates(
        env::var_os("LIQUIDD_CONFIG").map(PathBuf::from),
        env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        env::var_os("HOME").map(PathBuf::from),
    )
    .into_iter()
    .find(|p| p.exists())
}

/// Loaded configuration plus where it came from.
///
/// # Example
///
/// ```no_run
/// use liquidd::config::ConfigManager;
/// use std::path::PathBuf;
///
/// // Load from specific path
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml")))?;
///
/// // Load from standard locations, falling back to defaults
/// let config_manager = ConfigManager::load(None)?;
/// let root = &config_manager.config().object_root;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Config,
    path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self { config, path }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter (must exist)
    /// 2. LIQUIDD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/liquidd/config.yml or ~/.config/liquidd/config.yml
    /// 4. /etc/liquidd/config.yml
    ///
    /// Falls back to [`Config::default`] when no file is found.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let Some(config_path) = path.or_else(locate_config) else {
            return Ok(Self::new(Config::default(), None));
        };

        let config = Self::load_config_from_path(&config_path)?;
        Ok(Self::new(config, Some(config_path)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the file the configuration was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        info!("Loaded config from: {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn config_load_full_yaml() {
        let temp_file = create_temp_config(
            r#"
version: 1
bus: system
bus_name: org.example.Cooling
object_root: /org/example/Cooling
max_report_size: 512
init_on_start: true
log_level: debug
"#,
        );

        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf())).unwrap();
        let config = manager.config();

        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.bus_name, "org.example.Cooling");
        assert_eq!(config.object_root, "/org/example/Cooling");
        assert_eq!(config.max_report_size, 512);
        assert!(config.init_on_start);
        assert_eq!(LevelFilter::from(config.log_level), LevelFilter::Debug);
        assert_eq!(manager.path(), Some(temp_file.path()));
    }

    #[test]
    fn config_minimal_yaml_uses_defaults() {
        let temp_file = create_temp_config("version: 1\n");
        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf())).unwrap();
        assert_eq!(manager.config(), &Config::default());
    }

    #[test]
    fn config_rejects_unknown_version() {
        let temp_file = create_temp_config("version: 2\n");
        let err = ConfigManager::load(Some(temp_file.path().to_path_buf())).unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported config version 2"));
    }

    #[test]
    fn config_rejects_bad_object_root() {
        for root in ["org/liquidctl", "/org/liquidctl/", "/", "/org/liq-uid"] {
            let config = Config {
                object_root: root.to_string(),
                ..Config::default()
            };
            assert!(config.validate().is_err(), "{root} should be rejected");
        }
    }

    #[test]
    fn config_rejects_empty_bus_name() {
        let config = Config {
            bus_name: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_missing_explicit_path_is_an_error() {
        assert!(ConfigManager::load(Some(PathBuf::from("/nonexistent/liquidd.yml"))).is_err());
    }

    #[test]
    fn config_candidates_order() {
        let candidates = config_candidates(
            Some(PathBuf::from("/tmp/env.yml")),
            None,
            Some(PathBuf::from("/home/user")),
        );
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/tmp/env.yml"),
                PathBuf::from("/home/user/.config/liquidd/config.yml"),
                PathBuf::from("/etc/liquidd/config.yml"),
            ]
        );

        let candidates = config_candidates(None, Some(PathBuf::from("/xdg")), None);
        assert_eq!(candidates[0], PathBuf::from("/xdg/liquidd/config.yml"));
    }

    #[test]
    fn unknown_log_level_fails_to_parse() {
        let temp_file = create_temp_config("version: 1\nlog_level: loud\n");
        assert!(ConfigManager::load(Some(temp_file.path().to_path_buf())).is_err());
    }
}
