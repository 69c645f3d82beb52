//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock engine factory and duration probe injected, so the full
//! session lifecycle runs without an ffmpeg binary.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use squeeze_core::testing::{MockDurationProbe, MockEngineFactory};
use squeeze_core::{Config, ServerConfig};
use squeeze_server::api::create_router;
use squeeze_server::state::AppState;

const BOUNDARY: &str = "squeeze-test-boundary";

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_create_session() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/sessions", json!({
///         "component_id": "widget-1"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state, for direct session access
    pub state: Arc<AppState>,
    /// Mock engine factory - script engine loads and executions
    pub factory: Arc<MockEngineFactory>,
    /// Mock duration probe - configure video durations
    pub probe: Arc<MockDurationProbe>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response, for file downloads
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        Self::with_config(Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 8080,
                max_upload_bytes: 1024 * 1024,
            },
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        let factory = Arc::new(MockEngineFactory::new());
        let probe = Arc::new(MockDurationProbe::new());
        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&factory) as _,
            Arc::clone(&probe) as _,
        ));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            state,
            factory,
            probe,
        }
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Make a POST request with JSON body
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Make a POST request without a body
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Make a generic request
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);

        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };

        let request = builder.body(body).unwrap();
        self.send(request).await
    }

    /// Upload one file as the multipart field `file`
    pub async fn upload(
        &self,
        session_id: &str,
        filename: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> TestResponse {
        self.multipart(
            &format!("/api/v1/sessions/{}/files", session_id),
            "file",
            filename,
            media_type,
            bytes,
        )
        .await
    }

    /// POST a single-field multipart body
    pub async fn multipart(
        &self,
        path: &str,
        field: &str,
        filename: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", media_type).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// GET returning the raw body
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            content_type,
            bytes,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body_bytes).to_string())
            })
        };

        TestResponse { status, body }
    }

    /// Create a session and return its id
    pub async fn create_session(&self, component_id: &str) -> String {
        let response = self
            .post(
                "/api/v1/sessions",
                serde_json::json!({ "component_id": component_id }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        component_id.to_string()
    }

    /// Create a session and wait for its engine to be ready
    pub async fn ready_session(&self, component_id: &str) -> String {
        let id = self.create_session(component_id).await;
        self.wait_for_snapshot(&id, |s| s["engine"] == "ready" && s["status"] == "idle")
            .await;
        id
    }

    /// Poll the session snapshot until the predicate holds. Panics after 5s.
    pub async fn wait_for_snapshot<F>(&self, session_id: &str, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let path = format!("/api/v1/sessions/{}", session_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get(&path).await;
            let snapshot = response.body["snapshot"].clone();
            if predicate(&snapshot) {
                return snapshot;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Timed out waiting for snapshot, last: {}", snapshot);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll the outbox until it holds `count` files. Panics after 5s.
    pub async fn wait_for_outbox(&self, session_id: &str, count: usize) -> Vec<Value> {
        let path = format!("/api/v1/sessions/{}/outbox", session_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get(&path).await;
            let files = response.body["files"].as_array().cloned().unwrap_or_default();
            if files.len() >= count {
                return files;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Timed out waiting for outbox, last: {:?}", files);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
