pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
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
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::store::CredentialStore;
use crate::services::{
    AuthService, CredentialVerifier, EmailProvider, EventPublisher, IdentityProvider,
    IdentityStore, NotificationService, OtpManager, PermissionCache, SessionManager, TokenIssuer,
};

pub const NOTIFICATION_CREATE: &str = "notification:create";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IdentityConfig>,
    pub store: Arc<dyn IdentityStore>,
    pub users: Arc<dyn CredentialStore>,
    pub cache: Arc<dyn CacheStore>,
    pub auth: AuthService,
    pub otp: OtpManager,
    pub tokens: TokenIssuer,
    pub sessions: SessionManager,
    pub permissions: PermissionCache,
    pub notifications: NotificationService,
}

impl AppState {
    /// Wire every component onto one store.
    pub fn build<S>(
        config: IdentityConfig,
        store: Arc<S>,
        cache: Arc<dyn CacheStore>,
        email: Arc<dyn EmailProvider>,
        publisher: Arc<dyn EventPublisher>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self
    where
        S: IdentityStore + 'static,
    {
        let tokens = TokenIssuer::new(store.clone(), &config.tokens);
        let otp = OtpManager::new(store.clone(), email, &config.otp);
        let sessions = SessionManager::new(
            store.clone(),
            cache.clone(),
            tokens.clone(),
            config.cache.session_ttl_seconds,
        );
        let credentials =
            CredentialVerifier::new(store.clone(), config.google.default_role_name.clone());
        let permissions = PermissionCache::new(
            store.clone(),
            cache.clone(),
            config.cache.permission_ttl_seconds,
        );
        let notifications =
            NotificationService::new(store.clone(), publisher, config.events.topic.clone());
        let auth = AuthService::new(
            store.clone(),
            credentials,
            otp.clone(),
            tokens.clone(),
            sessions.clone(),
            identity_provider,
        );

        Self {
            config: Arc::new(config),
            users: store.clone(),
            store,
            cache,
            auth,
            otp,
            tokens,
            sessions,
            permissions,
            notifications,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let notification_routes = Router::new()
        .route("/notifications", post(handlers::notification::create_notification))
        .route_layer(from_fn_with_state(
            state.clone(),
            |state: State<AppState>, req: Request, next: Next| {
                middleware::require_permission(state, NOTIFICATION_CREATE, req, next)
            },
        ));

    let authenticated = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/auth/password/change",
            post(handlers::password::change_password),
        )
        .route("/sessions", get(handlers::session::list_sessions))
        .route(
            "/sessions/:session_id/revoke",
            post(handlers::session::revoke_session),
        )
        .route(
            "/sessions/:session_id/validity",
            get(handlers::session::session_validity),
        )
        .merge(notification_routes)
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/verify", post(handlers::auth::verify_code))
        .route("/auth/google", post(handlers::auth::google_login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/auth/password/forgot",
            post(handlers::password::forgot_password),
        )
        .route(
            "/auth/password/reset",
            post(handlers::password::reset_password),
        )
        .merge(authenticated)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(http_span))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .allow_credentials(true),
        )
}

/// Store and cache reachability.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::from(e)
    })?;

    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Cache health check failed");
        AppError::InternalError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up",
            "cache": "up"
        }
    })))
}
