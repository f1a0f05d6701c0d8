//! Streaming file responses with single-range support.

use crate::error::{AppError, Result};
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use metbox_core::FileDownload;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// MIME types a browser may render in place.
const INLINE_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "text/csv",
    "text/x-log",
    "application/json",
    "application/xml",
    "text/xml",
];

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

pub async fn file_response(download: FileDownload) -> Result<Response> {
    let FileDownload {
        file,
        filename,
        mime_type,
        size,
        range,
    } = download;

    let mut file = tokio::fs::File::from_std(file);
    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, mime_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&mime_type, &filename),
        )
        .header(header::ACCEPT_RANGES, "bytes");

    let (status, len) = match range {
        Some(range) => {
            file.seek(SeekFrom::Start(range.start)).await?;
            builder = builder.header(header::CONTENT_RANGE, range.content_range(size));
            (StatusCode::PARTIAL_CONTENT, range.len())
        }
        None => (StatusCode::OK, size),
    };

    let body = Body::from_stream(ReaderStream::new(file.take(len)));
    builder
        .status(status)
        .header(header::CONTENT_LENGTH, len)
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build download response: {e}")))
}

/// `Content-Disposition` value with an ASCII fallback name and an RFC 5987
/// encoded one.
pub fn content_disposition(mime_type: &str, filename: &str) -> String {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let disposition = if INLINE_TYPES.contains(&essence.as_str()) {
        "inline"
    } else {
        "attachment"
    };

    let ascii: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    format!(
        "{disposition}; filename=\"{ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

/// Uploaded MIME types end up in a response header, so anything that is not
/// a valid header value is replaced.
pub fn header_safe_mime_type(mime_type: Option<&str>) -> String {
    mime_type
        .map(str::trim)
        .filter(|m| !m.is_empty() && axum::http::HeaderValue::from_str(m).is_ok())
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string()
}
