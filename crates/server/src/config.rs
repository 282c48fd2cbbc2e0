//! Server configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SYSTEM_CONFIG_PATH: &str = "/etc/usbwatch/server.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub rest: RestSettings,
    #[serde(default)]
    pub indi: IndiSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl ServerSettings {
    fn default_log_level() -> String {
        "warn".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Timeout of every control request, in milliseconds
    #[serde(default = "UsbSettings::default_control_timeout")]
    pub control_timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            control_timeout_ms: Self::default_control_timeout(),
        }
    }
}

impl UsbSettings {
    fn default_control_timeout() -> u64 {
        protocol::DEFAULT_TIMEOUT.as_millis() as u64
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

/// REST front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "RestSettings::default_port")]
    pub port: u16,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: Self::default_port(),
        }
    }
}

impl RestSettings {
    fn default_port() -> u16 {
        80
    }
}

/// INDI front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndiSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "IndiSettings::default_port")]
    pub port: u16,
    /// Device name announced to clients, `USBWATCH_<HOSTNAME>` when unset
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for IndiSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: Self::default_port(),
            device: None,
        }
    }
}

impl IndiSettings {
    fn default_port() -> u16 {
        7624
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl ServerConfig {
    /// Load configuration from the specified path
    ///
    /// Without a path the user and system locations are tried in order.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![Self::default_path(), PathBuf::from(SYSTEM_CONFIG_PATH)];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbwatch").join("server.toml")
        } else {
            PathBuf::from(".config/usbwatch/server.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.usb.control_timeout_ms == 0 {
            return Err(anyhow!("usb.control_timeout_ms must be greater than 0"));
        }

        if self.rest.port == 0 {
            return Err(anyhow!("rest.port must not be 0"));
        }
        if self.indi.port == 0 {
            return Err(anyhow!("indi.port must not be 0"));
        }

        if let Some(device) = &self.indi.device
            && device.trim().is_empty()
        {
            return Err(anyhow!("indi.device must not be empty"));
        }

        Ok(())
    }
}

/// Expand `~` in a user-supplied config path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
