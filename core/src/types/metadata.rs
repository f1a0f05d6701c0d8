//! Metadata types for persistent application state.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Maintenance metadata. Missing fields default to None.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceMetadata {
    #[serde(default)]
    pub last_run_at: Option<SystemTime>,
}

/// Manifest polled by desktop clients to discover updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub version: String,
    pub interval: u64,
    pub payload: Vec<serde_json::Value>,
}

impl Default for UpdateManifest {
    fn default() -> Self {
        Self {
            version: "0".to_string(),
            interval: 3600,
            payload: Vec::new(),
        }
    }
}
