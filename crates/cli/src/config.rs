//! CLI configuration management

use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zerousb::{Id, Options};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Contents of `config.toml`
///
/// # Example Configuration
/// ```toml
/// log_level = "info"
///
/// [device]
/// vendor_id = 0x0483
/// product_id = 0xa27e
/// reset = false
///
/// [usb]
/// endpoint_in = 0x81
/// endpoint_out = 0x01
/// read_timeout = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "CliConfig::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub usb: Options,
}

/// Device to connect to when none is given on the command line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub vendor_id: Id,
    pub product_id: Id,
    /// Reset the device before claiming it
    pub reset: bool,
}

/// Command-line overrides for the `[usb]` section
#[derive(Debug, Clone, Default)]
pub struct UsbOverrides {
    pub interface: Option<u8>,
    pub configuration: Option<u8>,
    pub endpoint_in: Option<u8>,
    pub endpoint_out: Option<u8>,
    pub debug: bool,
    pub retry_zero_length: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            device: DeviceSettings::default(),
            usb: Options::default(),
        }
    }
}

impl CliConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Load configuration from `path`, or from the first standard location
    /// that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => expand(&p),
            None => Self::search_paths()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| Error::Config("No configuration file found".into()))?,
        };

        let content = fs::read_to_string(&config_path)?;
        let config: CliConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file {}: {}",
                config_path.display(),
                e
            ))
        })?;

        config.validate()?;

        tracing::debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))?;

        let path = expand(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Per-user configuration file path
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(config_dir) => config_dir.join("zerousb").join("config.toml"),
            None => PathBuf::from(".config/zerousb/config.toml"),
        }
    }

    fn search_paths() -> Vec<PathBuf> {
        vec![Self::default_path(), PathBuf::from("/etc/zerousb/config.toml")]
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}', must be one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let usb = &self.usb;
        if usb.endpoint_in.is_some() != usb.endpoint_out.is_some() {
            tracing::warn!(
                "Only one endpoint address configured; endpoints will be discovered instead"
            );
        }
        if let Some(address) = usb.endpoint_in
            && address & 0x80 == 0
        {
            return Err(Error::Config(format!(
                "endpoint_in {:#04x} is not an IN address",
                address
            )));
        }
        if let Some(address) = usb.endpoint_out
            && address & 0x80 != 0
        {
            return Err(Error::Config(format!(
                "endpoint_out {:#04x} is not an OUT address",
                address
            )));
        }

        Ok(())
    }

    /// Apply command-line overrides, then validate the merged result
    pub fn apply_overrides(&mut self, overrides: &UsbOverrides) -> Result<()> {
        let usb = &mut self.usb;
        if let Some(interface) = overrides.interface {
            usb.interface = interface;
        }
        if let Some(configuration) = overrides.configuration {
            usb.configuration = Some(configuration);
        }
        if let Some(address) = overrides.endpoint_in {
            usb.endpoint_in = Some(address);
        }
        if let Some(address) = overrides.endpoint_out {
            usb.endpoint_out = Some(address);
        }
        usb.debug |= overrides.debug;
        usb.retry_zero_length |= overrides.retry_zero_length;

        self.validate()
    }

    /// Device ids for commands that open a session
    pub fn target(&self) -> Result<(Id, Id)> {
        let DeviceSettings {
            vendor_id,
            product_id,
            ..
        } = self.device;

        if vendor_id == Id::ANY || product_id == Id::ANY {
            return Err(Error::InvalidArgument(format!(
                "Both vendor and product id are required to connect (got {}:{})",
                vendor_id, product_id
            )));
        }
        Ok((vendor_id, product_id))
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
