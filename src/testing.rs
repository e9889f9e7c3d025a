use std::path::Path;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{build_router, config::Config, store::Db, AppState};

const BOUNDARY: &str = "notes-api-test-boundary";

/// In-process app over an in-memory database and a scratch upload directory.
pub struct TestApp {
    _dir: TempDir,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_login_limit(burst: u32) -> Self {
        Self::with_config(|config| {
            config.login_rate_limit_burst = burst;
            config.login_rate_limit_per_minute = burst;
        })
    }

    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).unwrap();
        let mut config = Config::for_tests(dir.path().join("unused.db"), upload_dir);
        tweak(&mut config);

        let state = AppState::new(config, Db::open_in_memory().unwrap()).unwrap();
        let router = build_router(state.clone());
        Self {
            _dir: dir,
            state,
            router,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.state.config.upload_dir
    }

    pub async fn dispatch(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    fn parse(bytes: &[u8]) -> Value {
        if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(bytes).unwrap_or(Value::Null)
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let (status, _, bytes) = self.dispatch(request).await;
        (status, Self::parse(&bytes))
    }

    pub async fn get_raw(&self, uri: &str, token: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.dispatch(request).await
    }

    pub async fn upload(
        &self,
        uri: &str,
        token: &str,
        file_name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> (StatusCode, Value) {
        self.upload_field(uri, token, "file", file_name, content_type, bytes)
            .await
    }

    pub async fn upload_field(
        &self,
        uri: &str,
        token: &str,
        field: &str,
        file_name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .into_bytes();
        if let Some(content_type) = content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, _, bytes) = self.dispatch(request).await;
        (status, Self::parse(&bytes))
    }

    pub async fn register(&self, username: &str) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"username": username, "password": "password"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
        body
    }

    pub async fn register_and_login(&self, username: &str) -> String {
        self.register(username).await;
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"username": username, "password": "password"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login {username}: {body}");
        body["token"].as_str().unwrap().to_string()
    }
}
