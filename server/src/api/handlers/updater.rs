//! Update manifest polled by desktop clients.

use crate::api::{AppState, blocking};
use crate::error::Result;
use axum::{Json, extract::State};
use metbox_core::types::metadata::UpdateManifest;

pub async fn manifest(State(state): State<AppState>) -> Result<Json<UpdateManifest>> {
    let store = state.store.clone();
    let manifest = blocking(move || Ok(store.update_manifest()?)).await?;
    Ok(Json(manifest))
}
