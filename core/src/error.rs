//! Outcomes surfaced to callers of the clip store.

use crate::core::error::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClipError>;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Missing, expired and exhausted clips all look the same to callers.
    #[error("clip not found")]
    NotFound,

    /// The clip is a file whose hash has not been computed yet.
    #[error("clip is still processing")]
    Processing,

    #[error("range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content is empty")]
    EmptyContent,

    #[error("text too large: {size} bytes exceeds {max} bytes")]
    TextTooLarge { size: u64, max: u64 },

    #[error("link too long: {len} characters exceeds {max}")]
    LinkTooLong { len: usize, max: usize },

    #[error("content must be an absolute http(s) URL")]
    InvalidLink,

    #[error("file too large: exceeds {max} bytes")]
    FileTooLarge { max: u64 },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
