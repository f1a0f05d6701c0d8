//! Streams multipart file fields to their reserved on-disk location.

use crate::api::blocking;
use crate::api::download::header_safe_mime_type;
use crate::error::{AppError, Result};
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use metbox_core::types::{ContentHash, UploadedFile};
use metbox_core::{ClipError, ClipStore, ValidationError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;

/// A file written to disk but not yet owned by a clip.
///
/// Dropping it deletes the bytes on the blocking pool.
pub struct StagedFile {
    store: Arc<ClipStore>,
    path: Option<PathBuf>,
    filename: String,
    mime_type: String,
    size: u64,
}

impl StagedFile {
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hands the bytes over to clip creation, which cleans up on failure.
    pub fn into_uploaded(mut self, declared_hash: Option<ContentHash>) -> UploadedFile {
        UploadedFile {
            path: self.path.take().unwrap_or_default(),
            filename: std::mem::take(&mut self.filename),
            mime_type: std::mem::take(&mut self.mime_type),
            size: self.size,
            declared_hash,
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || store.discard_upload(&path));
            }
            Err(_) => store.discard_upload(&path),
        }
    }
}

/// Writes `field` chunk by chunk, giving up as soon as it grows past
/// `max_bytes`.
pub async fn stream_to_disk(
    store: &Arc<ClipStore>,
    mut field: Field<'_>,
    max_bytes: u64,
) -> Result<StagedFile> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let mime_type = header_safe_mime_type(field.content_type());

    let (path, absolute) = {
        let store = store.clone();
        let filename = filename.clone();
        blocking(move || Ok(store.reserve_upload(SystemTime::now(), &filename)?)).await?
    };

    let mut staged = StagedFile {
        store: store.clone(),
        path: Some(path),
        filename,
        mime_type,
        size: 0,
    };
    let mut out = tokio::fs::File::create(&absolute).await?;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        staged.size += chunk.len() as u64;
        if staged.size > max_bytes {
            tracing::debug!(
                filename = %staged.filename,
                max_bytes,
                "upload exceeds size ceiling"
            );
            return Err(ClipError::from(ValidationError::FileTooLarge { max: max_bytes }).into());
        }
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    out.sync_all().await?;

    Ok(staged)
}

pub fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge;
    }
    AppError::Validation(format!("invalid multipart body: {e}"))
}
