#![allow(dead_code)]

use metbox_core::ClipStore;
use metbox_core::types::{
    AccessPolicy, ClipDraft, Code, Config, ContentHash, DraftPayload, SavedConfig, UploadedFile,
};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub fn open_store() -> (ClipStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = ClipStore::open(Config {
        base_path: temp_dir.path().to_path_buf(),
        saved: SavedConfig::default(),
    })
    .unwrap();
    (store, temp_dir)
}

pub fn policy(max_accesses: u32, expire_secs: u64) -> AccessPolicy {
    AccessPolicy {
        max_accesses,
        expire_after: Duration::from_secs(expire_secs),
    }
}

pub fn create_text(store: &ClipStore, text: &str, policy: AccessPolicy, now: SystemTime) -> Code {
    store
        .create(
            ClipDraft {
                payload: DraftPayload::Text(text.to_string()),
                policy,
                client_ip: None,
            },
            now,
        )
        .unwrap()
        .clip
        .code
}

pub fn stage_upload(
    store: &ClipStore,
    now: SystemTime,
    name: &str,
    data: &[u8],
    declared_hash: Option<ContentHash>,
) -> UploadedFile {
    let (path, absolute) = store.reserve_upload(now, name).unwrap();
    std::fs::write(absolute, data).unwrap();
    UploadedFile {
        path,
        filename: name.to_string(),
        mime_type: "application/octet-stream".to_string(),
        size: data.len() as u64,
        declared_hash,
    }
}

/// Uploads `data` and returns the code with whether it was an instant upload.
pub fn create_file(
    store: &ClipStore,
    name: &str,
    data: &[u8],
    declared_hash: Option<ContentHash>,
    policy: AccessPolicy,
    now: SystemTime,
) -> (Code, bool) {
    let upload = stage_upload(store, now, name, data, declared_hash);
    let created = store
        .create(
            ClipDraft {
                payload: DraftPayload::File(upload),
                policy,
                client_ip: Some("192.0.2.1".to_string()),
            },
            now,
        )
        .unwrap();
    (created.clip.code, created.instant_upload)
}
