mod app;
mod core;
mod saved;

pub use app::{AppConfig, AppConfigError, LimitsConfig, MaintenanceConfig, ServerSection};
pub use self::core::{Config, Limits, SavedConfig};
