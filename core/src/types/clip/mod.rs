//! Clip records and the request-side drafts that create them.
//!
//! The stored layout lives in [`versioned_clip`]; the latest version is
//! re-exported from `metbox_core::types` as `Clip`.

use crate::types::content_hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

pub(crate) mod versioned_clip;

pub use versioned_clip::latest::{Clip, Content, FileData, FileHash};

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Text,
    Link,
    File,
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipKind::Text => write!(f, "text"),
            ClipKind::Link => write!(f, "link"),
            ClipKind::File => write!(f, "file"),
        }
    }
}

impl Clip {
    pub fn kind(&self) -> ClipKind {
        match self.content {
            Content::Text { .. } => ClipKind::Text,
            Content::Link { .. } => ClipKind::Link,
            Content::File(_) => ClipKind::File,
        }
    }

    /// Creation rejects any `expire_after` that would not fit, so stored
    /// clips always have a representable expiry.
    pub fn expires_at(&self) -> SystemTime {
        self.created_at + self.expire_after
    }

    /// A clip is expired strictly after `created_at + expire_after`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now > self.expires_at()
    }

    /// Files whose hash has not been computed yet cannot be served.
    pub fn is_processing(&self) -> bool {
        matches!(
            &self.content,
            Content::File(FileData {
                hash: FileHash::Pending,
                ..
            })
        )
    }

    pub fn is_accessible(&self, now: SystemTime) -> bool {
        !self.is_expired(now) && self.remaining_accesses > 0 && !self.is_processing()
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        match &self.content {
            Content::File(file) => file.hash.content_hash(),
            _ => None,
        }
    }

    pub fn file(&self) -> Option<&FileData> {
        match &self.content {
            Content::File(file) => Some(file),
            _ => None,
        }
    }
}

impl FileHash {
    pub fn content_hash(&self) -> Option<&ContentHash> {
        match self {
            FileHash::Pending => None,
            FileHash::Declared(hash)
            | FileHash::Reused { hash, .. }
            | FileHash::Confirmed(hash) => Some(hash),
        }
    }

    /// Whether the background verifier still has work to do for this clip.
    pub fn needs_verification(&self) -> bool {
        !matches!(self, FileHash::Confirmed(_))
    }
}

/// Access limits chosen by the creator of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub max_accesses: u32,
    pub expire_after: Duration,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            max_accesses: 1,
            expire_after: Duration::from_secs(3600),
        }
    }
}

/// A file already written below the files root, waiting to be registered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Location relative to the files root, as returned by
    /// [`FileStorage::reserve_upload_path`](crate::core::file_storage::FileStorage::reserve_upload_path).
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub declared_hash: Option<ContentHash>,
}

#[derive(Debug, Clone)]
pub enum DraftPayload {
    Text(String),
    Link(String),
    File(UploadedFile),
}

/// Everything needed to create a clip except its code.
#[derive(Debug, Clone)]
pub struct ClipDraft {
    pub payload: DraftPayload,
    pub policy: AccessPolicy,
    pub client_ip: Option<String>,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedClip {
    pub clip: Clip,
    /// The upload was attached to an existing blob instead of its own bytes.
    pub instant_upload: bool,
}

impl CreatedClip {
    pub fn needs_verification(&self) -> bool {
        self.clip
            .file()
            .is_some_and(|file| file.hash.needs_verification())
    }
}

#[cfg(test)]
mod tests;
