pub mod core;
pub mod error;
pub mod types;

pub use crate::core::error::StoreError;
pub use crate::core::{ClipStore, FileDownload, ReapOutcome, Retrieval, VerifyOutcome};
pub use crate::error::{ClipError, ValidationError};
