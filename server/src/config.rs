//! Server configuration: optional TOML file, then environment overrides.

use crate::error::{AppError, Result};
use metbox_core::types::{AppConfig, Config, SavedConfig};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address (host:port)
    pub bind_address: String,

    /// Data directory holding the database and uploaded files
    pub storage_root: PathBuf,

    /// Header consulted for the client address before the socket peer
    pub real_ip_header: String,

    /// Request body ceiling in bytes
    pub max_content_length: u64,

    /// Bearer token for the on-demand reap endpoint; disabled when unset
    pub admin_token: Option<String>,

    pub reap_interval: Duration,

    /// Settings handed to the clip store
    pub saved: SavedConfig,
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let storage_root = PathBuf::from(lookup("STORAGE_ROOT").unwrap_or_else(|| "./data".into()));
        let config_path = lookup("METBOX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::path(&storage_root));

        let mut app = AppConfig::load(&config_path).map_err(|e| {
            AppError::Config(format!("failed to load {}: {e}", config_path.display()))
        })?;

        if let Some(bind_address) = lookup("BIND_ADDRESS") {
            app.server.bind_address = bind_address;
        }
        if let Some(header) = lookup("REAL_IP_HEADER") {
            app.server.real_ip_header = header;
        }
        if let Some(token) = lookup("ADMIN_TOKEN") {
            app.server.admin_token = Some(token);
        }
        app.server.admin_token = app.server.admin_token.filter(|t| !t.trim().is_empty());

        override_number(&lookup, "MAX_TEXT_SIZE", &mut app.limits.max_text_size);
        override_number(&lookup, "MAX_LINK_LENGTH", &mut app.limits.max_link_length);
        override_number(&lookup, "MAX_UPLOAD_FILE_SIZE", &mut app.limits.max_upload_file_size);
        override_number(&lookup, "MAX_CONTENT_LENGTH", &mut app.server.max_content_length);
        override_number(&lookup, "REAP_INTERVAL_SECS", &mut app.maintenance.reap_interval_secs);
        override_number(
            &lookup,
            "PROCESSING_TIMEOUT_SECS",
            &mut app.maintenance.processing_timeout_secs,
        );
        override_number(&lookup, "ORPHAN_GRACE_SECS", &mut app.maintenance.orphan_grace_secs);

        let errors = app.validate();
        for error in &errors {
            tracing::warn!("invalid configuration, using default: {error}");
        }
        if !errors.is_empty() {
            app = app.with_defaults_for_invalid();
        }

        Ok(Self {
            bind_address: app.server.bind_address,
            storage_root,
            real_ip_header: app.server.real_ip_header,
            max_content_length: app.server.max_content_length,
            admin_token: app.server.admin_token,
            reap_interval: Duration::from_secs(app.maintenance.reap_interval_secs),
            saved: SavedConfig::new(&app.limits, &app.maintenance),
        })
    }

    /// Configuration for opening the clip store.
    pub fn core_config(&self) -> Config {
        Config {
            base_path: self.storage_root.clone(),
            saved: self.saved.clone(),
        }
    }
}

fn override_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring non-numeric setting"),
    }
}
