use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::auth::MessageResponse;
use crate::dtos::session::{DeviceValidityResponse, SessionInfo};
use crate::handlers::expired_session_cookie;
use crate::middleware::AuthUser;
use crate::AppState;

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SessionInfo>>, AppError> {
    let sessions = state.sessions.list(user.user_id).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionInfo::from_session(s, user.session_id))
            .collect(),
    ))
}

/// POST /sessions/:session_id/revoke
pub async fn revoke_session(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
    Path(session_id): Path<Uuid>,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    state.sessions.revoke(session_id, user.user_id).await?;

    let jar = if user.session_id == Some(session_id) {
        jar.remove(expired_session_cookie())
    } else {
        jar
    };

    Ok((jar, Json(MessageResponse::new("Session revoked"))))
}

/// GET /sessions/:session_id/validity
pub async fn session_validity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Json<DeviceValidityResponse> {
    let valid = state.sessions.is_device_valid(user.user_id, session_id).await;
    Json(DeviceValidityResponse { session_id, valid })
}
