pub(crate) mod config;
pub use config::{
    AppConfig, AppConfigError, Config, Limits, LimitsConfig, MaintenanceConfig, SavedConfig,
    ServerSection,
};

pub(crate) mod code;
pub use code::{CODE_ALPHABET, CODE_LENGTH, Code, MAX_CODE_LENGTH};

pub(crate) mod content_hash;
pub use content_hash::ContentHash;

pub(crate) mod clip;
pub use clip::{
    AccessPolicy, Clip, ClipDraft, ClipKind, Content, CreatedClip, DraftPayload, FileData,
    FileHash, TEXT_CONTENT_TYPE, UploadedFile,
};

pub(crate) mod deadline_key;
pub use deadline_key::DeadlineKey;

pub(crate) mod filename;
pub use filename::{display_filename, sanitize_filename};

pub mod metadata;

pub(crate) mod range;
pub use range::{ByteRange, RangeRequest, Unsatisfiable};
