pub mod config;
pub mod handlers;
pub mod handshake;
pub mod middleware;
pub mod registry;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::cache::CacheStore;
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{http_span, request_id_middleware},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::RealtimeConfig;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RealtimeConfig>,
    pub cache: Arc<dyn CacheStore>,
    pub registry: Arc<dyn ConnectionRegistry>,
}

impl AppState {
    pub fn new(
        config: RealtimeConfig,
        cache: Arc<dyn CacheStore>,
        registry: Arc<dyn ConnectionRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            registry,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let internal = Router::new()
        .route("/internal/deliver", post(handlers::deliver::deliver))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_delivery_key,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(internal)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(http_span))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}

pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Cache health check failed");
        AppError::InternalError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "connections": state.registry.connected_count(),
        "checks": {
            "cache": "up"
        }
    })))
}
