use super::{Limits, LimitsConfig, MaintenanceConfig, SavedConfig};
use std::time::Duration;

impl From<&LimitsConfig> for Limits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_text_bytes: config.max_text_size,
            max_link_chars: config.max_link_length,
            max_upload_bytes: config.max_upload_file_size,
        }
    }
}

impl SavedConfig {
    pub fn new(limits: &LimitsConfig, maintenance: &MaintenanceConfig) -> Self {
        Self {
            limits: limits.into(),
            processing_timeout: Duration::from_secs(maintenance.processing_timeout_secs),
            orphan_grace: Duration::from_secs(maintenance.orphan_grace_secs),
        }
    }
}
