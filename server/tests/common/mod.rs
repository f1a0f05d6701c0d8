#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use metbox_core::ClipStore;
use metbox_core::types::{Limits, SavedConfig};
use metbox_server::api::{AppState, create_router};
use metbox_server::config::ServerConfig;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "metbox-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<ClipStore>,
    pub temp: TempDir,
}

pub fn test_app(admin_token: Option<&str>) -> TestApp {
    let temp = TempDir::new().unwrap();
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        storage_root: temp.path().to_path_buf(),
        real_ip_header: "X-Real-IP".to_string(),
        max_content_length: 1024 * 1024,
        admin_token: admin_token.map(str::to_string),
        reap_interval: Duration::from_secs(600),
        saved: SavedConfig {
            limits: Limits {
                max_upload_bytes: 64,
                ..Limits::default()
            },
            ..SavedConfig::default()
        },
    };
    let store = Arc::new(ClipStore::open(config.core_config()).unwrap());
    let router = create_router(AppState::new(store.clone(), Arc::new(config)));
    TestApp {
        router,
        store,
        temp,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn create(&self, form: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/clip/create")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload(&self, fields: &[(&str, &str)], filename: &str, data: &[u8]) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/clip/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(fields, filename, data)))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, code: &str, range: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(format!("/clip/get/{code}"));
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub fn file_count(&self) -> usize {
        count_files(&self.temp.path().join("files"))
    }
}

pub fn multipart_body(fields: &[(&str, &str)], filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Polls `check` until it holds, failing the test after a few seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}
