use std::path::PathBuf;
use std::time::Duration;

/// Core configuration for [`ClipStore`](crate::core::ClipStore) initialization.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_path: PathBuf,
    pub saved: SavedConfig,
}

#[derive(Clone, Debug)]
pub struct SavedConfig {
    pub limits: Limits,
    /// How long a file may wait for its first hash before the reaper drops it.
    pub processing_timeout: Duration,
    /// Files and directories touched more recently than this survive the
    /// orphan sweeps, so uploads still streaming to disk are left alone.
    pub orphan_grace: Duration,
}

/// Size ceilings applied before anything is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// UTF-8 byte length of text clips.
    pub max_text_bytes: u64,
    /// Character length of link clips.
    pub max_link_chars: usize,
    pub max_upload_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_bytes: 5 * 1024 * 1024,
            max_link_chars: 2048,
            max_upload_bytes: 500 * 1024 * 1024,
        }
    }
}

impl Default for SavedConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            processing_timeout: Duration::from_secs(60 * 60),
            orphan_grace: Duration::from_secs(60 * 60),
        }
    }
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.base_path.join("metbox.redb")
    }

    pub fn files_path(&self) -> PathBuf {
        self.base_path.join("files")
    }
}
