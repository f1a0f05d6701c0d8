//! Clip endpoints.
//!
//!   POST /clip/create      - Create a text or link clip from a form
//!   GET  /clip/get/:code   - Retrieve a clip, consuming one access
//!   POST /clip/upload      - Create a file clip from a multipart upload
//!   POST /clip/reap        - Run the reaper now (requires ADMIN_TOKEN)

use crate::api::download::file_response;
use crate::api::upload::{StagedFile, multipart_error, stream_to_disk};
use crate::api::{AppState, blocking, client_ip};
use crate::error::{AppError, Result};
use crate::scheduler::spawn_verification;
use axum::{
    Form, Json,
    extract::{ConnectInfo, Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use metbox_core::Retrieval;
use metbox_core::types::{
    AccessPolicy, ClipDraft, Code, ContentHash, DraftPayload, RangeRequest,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use subtle::ConstantTimeEq;

const DEFAULT_COUNT: u32 = 1;
const DEFAULT_EXPIRE_SECS: u64 = 3600;

#[derive(Debug, Default, Deserialize)]
pub struct CreateForm {
    pub count: Option<String>,
    pub expire: Option<String>,
    /// `yes` stores the content as a link.
    pub link: Option<String>,
    pub content: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(form): Form<CreateForm>,
) -> Result<Json<Value>> {
    let policy = parse_policy(form.count.as_deref(), form.expire.as_deref())?;
    let content = form.content.unwrap_or_default();
    let payload = if form.link.as_deref().map(str::trim) == Some("yes") {
        DraftPayload::Link(content)
    } else {
        DraftPayload::Text(content)
    };
    let draft = ClipDraft {
        payload,
        policy,
        client_ip: client_ip(&headers, &state.config.real_ip_header, peer.map(|c| c.0)),
    };

    let store = state.store.clone();
    let created = blocking(move || Ok(store.create(draft, SystemTime::now())?)).await?;

    Ok(Json(json!({ "code": created.clip.code })))
}

pub async fn get(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let code = Code::try_from(code).map_err(|_| AppError::NotFound)?;
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(RangeRequest::parse);

    let store = state.store.clone();
    let retrieval = blocking(move || Ok(store.retrieve(&code, range, SystemTime::now())?)).await?;

    match retrieval {
        Retrieval::Text { text, content_type } => {
            Ok(([(header::CONTENT_TYPE, content_type)], text).into_response())
        }
        Retrieval::Redirect(location) => {
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
        Retrieval::File(download) => file_response(download).await,
    }
}

pub async fn upload(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let max_bytes = state.store.limits().max_upload_bytes;
    let mut staged: Option<StagedFile> = None;
    let mut count = None;
    let mut expire = None;
    let mut client_sha256 = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" if staged.is_none() => {
                staged = Some(stream_to_disk(&state.store, field, max_bytes).await?);
            }
            "count" => count = Some(field.text().await.map_err(multipart_error)?),
            "expire" => expire = Some(field.text().await.map_err(multipart_error)?),
            "client_sha256" => client_sha256 = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let staged =
        staged.ok_or_else(|| AppError::Validation("missing file field".to_string()))?;
    let policy = parse_policy(count.as_deref(), expire.as_deref())?;
    let declared_hash = parse_client_hash(client_sha256.as_deref())?;
    let declared = declared_hash.is_some();

    tracing::debug!(size = staged.size(), declared, "upload received");
    let draft = ClipDraft {
        payload: DraftPayload::File(staged.into_uploaded(declared_hash)),
        policy,
        client_ip: client_ip(&headers, &state.config.real_ip_header, peer.map(|c| c.0)),
    };

    let store = state.store.clone();
    let created = blocking(move || Ok(store.create(draft, SystemTime::now())?)).await?;
    if created.needs_verification() {
        spawn_verification(state.store.clone(), created.clip.code.clone());
    }

    if declared {
        Ok(Json(json!({
            "code": created.clip.code,
            "instant_upload": created.instant_upload,
        })))
    } else {
        Ok(Json(json!({ "code": created.clip.code })))
    }
}

pub async fn reap(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    let Some(token) = state.config.admin_token.as_deref() else {
        return Err(AppError::NotFound);
    };
    if !bearer_matches(&headers, token) {
        return Err(AppError::Unauthorized);
    }

    let store = state.store.clone();
    let outcome = blocking(move || Ok(store.reap(SystemTime::now()))).await?;

    Ok(Json(json!({
        "expired_removed": outcome.expired_removed,
        "orphan_files_removed": outcome.orphan_files_removed,
        "empty_dirs_removed": outcome.empty_dirs_removed,
    })))
}

fn bearer_matches(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|given| bool::from(given.as_bytes().ct_eq(token.as_bytes())))
}

fn parse_policy(count: Option<&str>, expire: Option<&str>) -> Result<AccessPolicy> {
    Ok(AccessPolicy {
        max_accesses: parse_field("count", count, DEFAULT_COUNT)?,
        expire_after: Duration::from_secs(parse_field("expire", expire, DEFAULT_EXPIRE_SECS)?),
    })
}

/// Missing or blank fields take the default; anything else must be an integer.
fn parse_field<T: std::str::FromStr>(name: &str, raw: Option<&str>, default: T) -> Result<T> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| AppError::Validation(format!("{name} must be a positive integer"))),
    }
}

fn parse_client_hash(raw: Option<&str>) -> Result<Option<ContentHash>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => ContentHash::try_from(s)
            .map(Some)
            .map_err(|_| AppError::Validation("client_sha256 must be 64 hex characters".into())),
    }
}
