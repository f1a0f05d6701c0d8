use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Operator-facing configuration, persisted as config.toml.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl AppConfig {
    /// Returns the config file path within the given data directory.
    pub fn path(data_dir: &Path) -> std::path::PathBuf {
        data_dir.join("config.toml")
    }

    /// Loads config from a TOML file. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, AppConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), AppConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates config values and returns list of validation errors.
    /// Returns empty vec if config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.limits.max_text_size == 0 {
            errors.push("max_text_size must be at least 1".to_string());
        }
        if self.limits.max_link_length == 0 {
            errors.push("max_link_length must be at least 1".to_string());
        }
        if self.limits.max_upload_file_size == 0 {
            errors.push("max_upload_file_size must be at least 1".to_string());
        }
        if self.server.max_content_length < self.limits.max_upload_file_size {
            errors.push("max_content_length must not be below max_upload_file_size".to_string());
        }
        if self.maintenance.reap_interval_secs == 0 {
            errors.push("reap_interval_secs must be at least 1".to_string());
        }

        errors
    }

    /// Returns a validated config, replacing invalid values with defaults.
    pub fn with_defaults_for_invalid(&self) -> Self {
        let defaults = Self::default();
        let nonzero = |value: u64, default: u64| if value == 0 { default } else { value };

        let limits = LimitsConfig {
            max_text_size: nonzero(self.limits.max_text_size, defaults.limits.max_text_size),
            max_link_length: if self.limits.max_link_length == 0 {
                defaults.limits.max_link_length
            } else {
                self.limits.max_link_length
            },
            max_upload_file_size: nonzero(
                self.limits.max_upload_file_size,
                defaults.limits.max_upload_file_size,
            ),
        };

        Self {
            server: ServerSection {
                max_content_length: self
                    .server
                    .max_content_length
                    .max(limits.max_upload_file_size),
                ..self.server.clone()
            },
            limits,
            maintenance: MaintenanceConfig {
                reap_interval_secs: nonzero(
                    self.maintenance.reap_interval_secs,
                    defaults.maintenance.reap_interval_secs,
                ),
                ..self.maintenance.clone()
            },
        }
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Header carrying the client address when running behind a proxy.
    #[serde(default = "default_real_ip_header")]
    pub real_ip_header: String,
    /// Request body ceiling enforced by the HTTP layer.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: u64,
    /// Enables the on-demand reap endpoint when set.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            real_ip_header: default_real_ip_header(),
            max_content_length: default_max_content_length(),
            admin_token: None,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_real_ip_header() -> String {
    "X-Real-IP".to_string()
}

fn default_max_content_length() -> u64 {
    500 * 1024 * 1024
}

/// Content size ceilings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_text_size")]
    pub max_text_size: u64,
    #[serde(default = "default_max_link_length")]
    pub max_link_length: usize,
    #[serde(default = "default_max_upload_file_size")]
    pub max_upload_file_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_size: default_max_text_size(),
            max_link_length: default_max_link_length(),
            max_upload_file_size: default_max_upload_file_size(),
        }
    }
}

fn default_max_text_size() -> u64 {
    5 * 1024 * 1024
}

fn default_max_link_length() -> usize {
    2048
}

fn default_max_upload_file_size() -> u64 {
    500 * 1024 * 1024
}

/// Background reaper settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_orphan_grace_secs")]
    pub orphan_grace_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            reap_interval_secs: default_reap_interval_secs(),
            processing_timeout_secs: default_processing_timeout_secs(),
            orphan_grace_secs: default_orphan_grace_secs(),
        }
    }
}

fn default_reap_interval_secs() -> u64 {
    600
}

fn default_processing_timeout_secs() -> u64 {
    3600
}

fn default_orphan_grace_secs() -> u64 {
    3600
}

/// Errors that can occur when loading or saving config.
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
