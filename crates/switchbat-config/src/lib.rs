//! Configuration management for switchbat
//!
//! A single TOML file describes which I2C bus and addresses to use, how the
//! supplies are named, how often to poll and where reports go. Every field has
//! a default matching the stock Acer Switch 11, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Failed to merge configuration sources: {0}")]
    Layered(#[from] config::ConfigError),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/switchbat";
pub const CONFIG_FILE: &str = "config.toml";

/// Prefix of environment overrides, e.g. `SWITCHBAT_POLL__INTERVAL_MS=250`
pub const ENV_PREFIX: &str = "SWITCHBAT";

/// Highest 7-bit I2C slave address
pub const MAX_I2C_ADDRESS: u16 = 0x7F;

/// Main switchbat configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchbatConfig {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub battery: BatteryConfig,

    #[serde(default)]
    pub adapter: AdapterConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Embedded controller location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// `/dev/i2c-<index>`
    #[serde(default = "default_bus_index")]
    pub index: u8,
    #[serde(default = "default_controller_address")]
    pub gauge_address: u16,
    #[serde(default = "default_controller_address")]
    pub adapter_address: u16,
}

fn default_bus_index() -> u8 {
    1
}

fn default_controller_address() -> u16 {
    0x70
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            index: default_bus_index(),
            gauge_address: default_controller_address(),
            adapter_address: default_controller_address(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryConfig {
    #[serde(default = "default_battery_name")]
    pub name: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    /// Starting full-charge capacity in 10 mWh units
    #[serde(default = "default_design_full_capacity")]
    pub design_full_capacity: u32,
}

fn default_battery_name() -> String {
    "BAT0".to_string()
}

fn default_model_name() -> String {
    "Acer Switch 11 Battery".to_string()
}

fn default_manufacturer() -> String {
    "Acer".to_string()
}

fn default_design_full_capacity() -> u32 {
    3750
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            name: default_battery_name(),
            model_name: default_model_name(),
            manufacturer: default_manufacturer(),
            design_full_capacity: default_design_full_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Set to false to run without an AC adapter supply
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_adapter_name")]
    pub name: String,
}

fn default_true() -> bool {
    true
}

fn default_adapter_name() -> String {
    "ADP1".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_adapter_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Attempts per bus transaction phase
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory receiving `<supply>/uevent` and `<supply>/state.json`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl SwitchbatConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an optional TOML file overlaid with `SWITCHBAT_*` variables
    ///
    /// `env` replaces the process environment when given. Nested keys use a
    /// double underscore: `SWITCHBAT_BUS__GAUGE_ADDRESS=112`.
    pub fn load_layered(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let config: Self = builder.add_source(environment).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the system configuration file plus environment overrides
    pub fn load_default() -> Result<Self, ConfigError> {
        let system_config = Path::new(CONFIG_DIR).join(CONFIG_FILE);
        if !system_config.exists() {
            tracing::warn!("No configuration file found, using defaults");
        }

        Self::load_layered(Some(&system_config), None)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid("poll.interval_ms must be non-zero".into()));
        }
        if self.poll.max_attempts == 0 {
            return Err(ConfigError::Invalid("poll.max_attempts must be at least 1".into()));
        }
        if self.bus.gauge_address > MAX_I2C_ADDRESS {
            return Err(ConfigError::Invalid(format!(
                "bus.gauge_address 0x{:X} is not a 7-bit address",
                self.bus.gauge_address
            )));
        }
        if self.adapter.enabled && self.bus.adapter_address > MAX_I2C_ADDRESS {
            return Err(ConfigError::Invalid(format!(
                "bus.adapter_address 0x{:X} is not a 7-bit address",
                self.bus.adapter_address
            )));
        }
        if self.battery.name.trim().is_empty() {
            return Err(ConfigError::Invalid("battery.name must not be empty".into()));
        }
        Ok(())
    }
}
