//! Authorises a connection attempt against the session projection the
//! identity service mirrors into the cache.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use service_core::cache::CacheStore;
use service_core::realtime::{session_cache_key, SessionProjection};
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("A valid session id is required")]
    MissingSession,

    /// Also covers a projection that has not been mirrored yet.
    #[error("Session is not available")]
    UnknownSession,

    #[error("Session lookup failed: {0}")]
    Cache(anyhow::Error),
}

impl HandshakeError {
    /// Whether the same request may succeed later.
    pub fn retryable(&self) -> bool {
        !matches!(self, HandshakeError::MissingSession)
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let status = match self {
            HandshakeError::MissingSession | HandshakeError::UnknownSession => {
                StatusCode::UNAUTHORIZED
            }
            HandshakeError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let error = match &self {
            HandshakeError::Cache(_) => "Session lookup unavailable".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({
                "error": error,
                "retry": self.retryable(),
            })),
        )
            .into_response()
    }
}

/// The query parameter wins over the cookie.
pub fn presented_session_id(
    query: &HandshakeQuery,
    jar: &CookieJar,
) -> Result<Uuid, HandshakeError> {
    let raw = query
        .session_id
        .clone()
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .ok_or(HandshakeError::MissingSession)?;

    Uuid::parse_str(raw.trim()).map_err(|_| HandshakeError::MissingSession)
}

#[tracing::instrument(skip(cache))]
pub async fn resolve_session(
    cache: &dyn CacheStore,
    session_id: Uuid,
) -> Result<SessionProjection, HandshakeError> {
    let cached = cache
        .get(&session_cache_key(session_id))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session projection lookup failed");
            HandshakeError::Cache(e)
        })?
        .ok_or(HandshakeError::UnknownSession)?;

    let projection: SessionProjection = serde_json::from_str(&cached).map_err(|e| {
        tracing::warn!(error = %e, "Unreadable session projection");
        HandshakeError::UnknownSession
    })?;

    if projection.session_id != session_id {
        tracing::warn!(projected = %projection.session_id, "Session projection under the wrong key");
        return Err(HandshakeError::UnknownSession);
    }

    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Cookie;
    use chrono::Utc;
    use service_core::cache::MockCache;

    fn projection(session_id: Uuid) -> SessionProjection {
        SessionProjection {
            session_id,
            user_id: Uuid::new_v4(),
            email: Some("u1@example.com".to_string()),
            username: Some("U1".to_string()),
            ip_address: "198.51.100.7".to_string(),
            user_agent: "test".to_string(),
            created_utc: Utc::now(),
            last_active_utc: Utc::now(),
        }
    }

    #[test]
    fn test_query_takes_precedence_over_cookie() {
        let from_query = Uuid::new_v4();
        let from_cookie = Uuid::new_v4();
        let query = HandshakeQuery {
            session_id: Some(from_query.to_string()),
        };
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, from_cookie.to_string()));

        assert_eq!(presented_session_id(&query, &jar).unwrap(), from_query);
        assert_eq!(
            presented_session_id(&HandshakeQuery::default(), &jar).unwrap(),
            from_cookie
        );
    }

    #[test]
    fn test_garbage_session_id_is_missing() {
        let query = HandshakeQuery {
            session_id: Some("not-a-uuid".to_string()),
        };
        let err = presented_session_id(&query, &CookieJar::new()).unwrap_err();
        assert!(matches!(err, HandshakeError::MissingSession));
        assert!(!err.retryable());
    }

    #[tokio::test]
    async fn test_resolves_mirrored_projection() {
        let cache = MockCache::new();
        let session_id = Uuid::new_v4();
        let expected = projection(session_id);
        cache
            .set_ex(
                &session_cache_key(session_id),
                &serde_json::to_string(&expected).unwrap(),
                60,
            )
            .await
            .unwrap();

        let resolved = resolve_session(&cache, session_id).await.unwrap();
        assert_eq!(resolved, expected);
    }

    #[tokio::test]
    async fn test_unmirrored_session_is_retryable() {
        let cache = MockCache::new();
        let err = resolve_session(&cache, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, HandshakeError::UnknownSession));
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn test_cache_outage_fails_closed() {
        let cache = MockCache::new();
        cache.set_unavailable(true);
        let err = resolve_session(&cache, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Cache(_)));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
