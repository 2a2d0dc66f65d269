use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{handlers::SESSION_COOKIE, AppState};

/// The caller behind a valid bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub session_id: Option<Uuid>,
}

/// Require a live access token. The session named by the cookie, if it
/// belongs to the caller, has its activity bumped.
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let access = state.tokens.authenticate(token).await?;

    let user = state
        .users
        .find_user_by_id(access.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

    let cookie_session = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());

    // A cookie naming someone else's session is ignored outright
    let session_id = match cookie_session {
        Some(session_id) => match state.sessions.touch_owned(session_id, user.user_id).await {
            Ok(touched) => {
                if !touched {
                    tracing::debug!(%session_id, "Revoked session not touched");
                }
                Some(session_id)
            }
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "Session cookie ignored");
                None
            }
        },
        None => None,
    };

    req.extensions_mut().insert(AuthUser {
        user_id: user.user_id,
        role_id: user.role_id,
        session_id,
    });

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().copied().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth user missing from request extensions"
            ))
        })
    }
}
