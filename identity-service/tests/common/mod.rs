//! Shared setup for identity-service integration tests.
//!
//! Everything runs in-process on `MemoryStore` and the mock collaborators, so
//! no PostgreSQL, Redis or SMTP is needed.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::IdentityConfig,
    models::{DeviceContext, Role, User},
    services::{
        store::CredentialStore, MemoryStore, MockEmailService, MockIdentityProvider,
        MockPublisher,
    },
    utils::{hash_password, Password},
    AppState,
};
use service_core::cache::MockCache;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const USERNAME: &str = "U1";
pub const EMAIL: &str = "u1@example.com";
pub const PASSWORD: &str = "Sup3r!";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MockCache>,
    pub email: Arc<MockEmailService>,
    pub publisher: Arc<MockPublisher>,
    pub provider: Arc<MockIdentityProvider>,
    pub role_id: Uuid,
    pub user: User,
}

impl TestApp {
    /// Fresh app with the default role and user `U1` / `Sup3r!`.
    pub async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MockCache::new());
        let email = Arc::new(MockEmailService::new());
        let publisher = Arc::new(MockPublisher::new());
        let provider = Arc::new(MockIdentityProvider::new());

        let role_id = store.insert_role(Role::new("user")).unwrap();
        let user = Self::seed_user(&store, EMAIL, USERNAME, PASSWORD, role_id).await;

        let state = AppState::build(
            IdentityConfig::for_tests(),
            store.clone(),
            cache.clone(),
            email.clone(),
            publisher.clone(),
            provider.clone(),
        );

        Self {
            state,
            store,
            cache,
            email,
            publisher,
            provider,
            role_id,
            user,
        }
    }

    pub async fn seed_user(
        store: &MemoryStore,
        email: &str,
        username: &str,
        password: &str,
        role_id: Uuid,
    ) -> User {
        let hash = hash_password(&Password::new(password)).unwrap();
        let user = User::new(email.to_string(), hash.into_string(), role_id).with_username(username);
        store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn add_user(&self, email: &str, username: &str) -> User {
        Self::seed_user(&self.store, email, username, PASSWORD, self.role_id).await
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// The last code mailed to `email`.
    pub fn code_for(&self, email: &str) -> String {
        self.email.last_code_for(email).expect("no code was mailed")
    }

    /// Password + code through HTTP. Returns the verify response.
    pub async fn sign_in(&self, cookie: Option<&str>) -> TestResponse {
        let login = self
            .send(post_json(
                "/auth/login",
                serde_json::json!({ "username": USERNAME, "password": PASSWORD }),
                None,
            ))
            .await;
        assert_eq!(login.status, StatusCode::ACCEPTED);

        let code = self.code_for(EMAIL);
        self.send(post_json(
            "/auth/verify",
            serde_json::json!({ "email": EMAIL, "code": code }),
            cookie,
        ))
        .await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    /// `session_id=<uuid>` taken from the Set-Cookie header.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("session_id="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    pub fn str_field(&self, name: &str) -> String {
        self.body[name].as_str().unwrap_or_default().to_string()
    }
}

pub fn post_json(uri: &str, body: serde_json::Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "integration-test")
        .header("x-forwarded-for", "198.51.100.7");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn authed(
    method: &str,
    uri: &str,
    access_token: &str,
    body: Option<serde_json::Value>,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn device() -> DeviceContext {
    DeviceContext::new("198.51.100.7", "integration-test")
}

/// A six-digit code guaranteed to differ from `code`.
pub fn wrong_code(code: &str) -> &'static str {
    if code == "000000" {
        "111111"
    } else {
        "000000"
    }
}
