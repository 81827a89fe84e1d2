//! Common test utilities for aulad HTTP tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use aulad::api::create_router;
use aulad::config::Config;
use aulad::control_db::ControlDb;
use aulad::state::AppState;

pub const ADMIN_ID: &str = "99999999";
pub const ADMIN_SECRET: &str = "admin123";

/// Default config with a fixed signing secret and CORS off.
pub fn test_config() -> Config {
    let mut config = Config {
        cors_enabled: false,
        ..Default::default()
    };
    config.auth.jwt_secret = Some("integration-test-secret".to_string());
    config
}

/// In-process application over a private in-memory database
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let db = Arc::new(ControlDb::in_memory().expect("in-memory db"));
        let state = AppState::with_db(config, db).await.expect("state");
        let router = create_router(state.clone());
        Self { state, router }
    }

    /// Replace the router (e.g. to merge extra test routes).
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub async fn request(
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
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");
        let status = resp.status();
        (status, body_json(resp.into_body()).await)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Log in and return the session token (panics on failure).
    pub async fn login(&self, identifier: &str, secret: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(serde_json::json!({ "identifier": identifier, "secret": secret })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_ID, ADMIN_SECRET).await
    }

    /// Create a user through the API as admin and return its id.
    pub async fn create_user(&self, identifier: &str, secret: &str, role: &str) -> i64 {
        let token = self.admin_token().await;
        let (status, body) = self
            .post(
                "/api/v1/users",
                &token,
                serde_json::json!({
                    "identifier": identifier,
                    "secret": secret,
                    "role": role,
                    "display_name": format!("User {identifier}"),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user failed: {body}");
        body["id"].as_i64().expect("id")
    }
}

/// Collect a body as JSON; empty bodies become `Value::Null`.
pub async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.expect("body").to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}
