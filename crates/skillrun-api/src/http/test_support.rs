//! In-process harness for router tests: a temp-dir database, the full
//! router, and helpers to issue authenticated JSON requests.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use skillrun_core::repository::principal::PrincipalRepository;
use skillrun_infra::crypto::api_key::{generate_api_key, hash_api_key};
use skillrun_types::config::GlobalConfig;
use skillrun_types::principal::Principal;

use crate::http::router::build_router;
use crate::state::AppState;

pub struct TestApp {
    pub state: AppState,
    router: Router,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(GlobalConfig::default()).await
    }

    pub async fn with_config(config: GlobalConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), config).await.unwrap();
        let router = build_router(state.clone());
        Self {
            state,
            router,
            _dir: dir,
        }
    }

    /// Register a principal and return it with its plaintext API key.
    pub async fn principal(&self, name: &str) -> (Principal, String) {
        let principal = Principal::new(name);
        let key = generate_api_key();
        self.state
            .principals
            .create(&principal, &hash_api_key(&key))
            .await
            .unwrap();
        (principal, key)
    }

    pub async fn get(&self, path: &str, key: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, path, key, None).await
    }

    pub async fn post(&self, path: &str, key: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, Some(key), Some(body)).await
    }

    pub async fn put(&self, path: &str, key: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, path, Some(key), Some(body)).await
    }

    pub async fn delete(&self, path: &str, key: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, path, Some(key), None).await
    }

    /// Create a skill through the API and return its id.
    pub async fn create_skill(&self, key: &str, name: &str, visibility: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/skills",
                key,
                serde_json::json!({
                    "name": name,
                    "visibility": visibility,
                    "content": {
                        "skill_md": format!("# {name}\n\nDo the thing."),
                        "manifest": format!("name: {name}\nversion: 1\n"),
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["skill"]["id"].as_str().unwrap().to_string()
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}
