use crate::types::code::Code;
use crate::types::content_hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use super::ClipVariant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub code: Code,
    pub content: Content,
    pub client_ip: Option<String>,
    pub remaining_accesses: u32,
    pub max_accesses: u32,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub expire_after: Duration,
    /// Timestamp under which the clip is filed in the deadline index.
    pub deadline: SystemTime,
}

impl ClipVariant for Clip {
    const VERSION: u8 = 1;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Text { text: String, content_type: String },
    Link { url: String },
    File(FileData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Name as uploaded, used for display and the download header.
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    /// Location of the served bytes, relative to the files root.
    pub path: String,
    pub hash: FileHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileHash {
    /// No hash yet. `path` is owned by this clip alone.
    Pending,
    /// Client-declared and not yet checked. `path` is owned by this clip alone.
    Declared(ContentHash),
    /// Client-declared and matched a confirmed blob. `path` is the shared blob,
    /// the uploaded bytes wait at `staged` until they are checked.
    Reused { hash: ContentHash, staged: String },
    /// Checked. `path` is the shared blob registered under this hash.
    Confirmed(ContentHash),
}
