//! In-process harness for realtime-service tests: `MockCache` plus a real
//! `ShardedRegistry`.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use chrono::Utc;
use realtime_service::{
    build_router, config::RealtimeConfig, middleware::DELIVERY_KEY_HEADER,
    registry::{ConnectionHandle, ConnectionRegistry, ShardedRegistry},
    AppState,
};
use service_core::cache::{CacheStore, MockCache};
use service_core::realtime::{session_cache_key, SessionProjection};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub state: AppState,
    pub cache: Arc<MockCache>,
    pub registry: Arc<ShardedRegistry>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl TestApp {
    pub fn spawn() -> Self {
        let cache = Arc::new(MockCache::new());
        let registry = Arc::new(ShardedRegistry::new());
        let state = AppState::new(RealtimeConfig::for_tests(), cache.clone(), registry.clone());

        Self {
            state,
            cache,
            registry,
        }
    }

    pub fn delivery_key(&self) -> String {
        self.state.config.delivery.api_key.clone()
    }

    /// Mirror a session projection the way the identity service does.
    pub async fn mirror_session(&self, user_id: Uuid) -> Uuid {
        let session_id = Uuid::new_v4();
        let projection = SessionProjection {
            session_id,
            user_id,
            email: Some("u1@example.com".to_string()),
            username: Some("U1".to_string()),
            ip_address: "198.51.100.7".to_string(),
            user_agent: "integration-test".to_string(),
            created_utc: Utc::now(),
            last_active_utc: Utc::now(),
        };
        self.cache
            .set_ex(
                &session_cache_key(session_id),
                &serde_json::to_string(&projection).unwrap(),
                60,
            )
            .await
            .unwrap();
        session_id
    }

    /// Stand-in for a live socket: the receiver sees what the writer task would.
    pub fn connect(&self, user_id: Uuid) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        self.registry.register(user_id, ConnectionHandle::new(tx));
        rx
    }

    pub fn registry_count(&self) -> usize {
        self.registry.connected_count()
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let res = build_router(self.state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        TestResponse { status, body }
    }
}

pub fn deliver_request(key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::post("/internal/deliver").header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header(DELIVERY_KEY_HEADER, key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}
