//! Sign-in, token refresh and logout.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::dtos::auth::{
    GoogleLoginRequest, LoginChallengeResponse, LoginRequest, LoginResponse, MessageResponse,
    RefreshRequest, RefreshResponse, VerifyCodeRequest,
};
use crate::handlers::{presented_session, session_cookie};
use crate::middleware::{AuthUser, Device};
use crate::models::LoginIdentifier;
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

/// Check the primary credential and mail a one-time code.
///
/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<(StatusCode, Json<LoginChallengeResponse>), AppError> {
    let identifier = LoginIdentifier::from_parts(
        req.email.as_deref(),
        req.phone.as_deref(),
        req.username.as_deref(),
    )
    .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("An identifier is required")))?;

    let challenge = state
        .auth
        .login(&identifier, &Password::new(req.password))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(LoginChallengeResponse {
            message: "Verification code sent".to_string(),
            code_expiry_utc: challenge.code_expiry_utc,
        }),
    ))
}

/// Exchange a one-time code for tokens and a session.
///
/// POST /auth/verify
pub async fn verify_code(
    State(state): State<AppState>,
    Device(device): Device,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<VerifyCodeRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let signed_in = state
        .auth
        .verify_code(
            &req.email.to_lowercase(),
            &req.code,
            &device,
            presented_session(&jar),
        )
        .await?;

    let jar = jar.add(session_cookie(&state, signed_in.session.session_id));
    Ok((jar, Json(LoginResponse::from(signed_in))))
}

/// Sign in with a Google access token.
///
/// POST /auth/google
pub async fn google_login(
    State(state): State<AppState>,
    Device(device): Device,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<GoogleLoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let signed_in = state
        .auth
        .google_login(&req.access_token, &device, presented_session(&jar))
        .await?;

    let jar = jar.add(session_cookie(&state, signed_in.session.session_id));
    Ok((jar, Json(LoginResponse::from(signed_in))))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Device(device): Device,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<(CookieJar, Json<RefreshResponse>), AppError> {
    let refreshed = state
        .auth
        .refresh(
            &req.refresh_token,
            req.user_id,
            &device,
            presented_session(&jar),
        )
        .await?;

    let jar = jar.add(session_cookie(&state, refreshed.session_id));
    Ok((
        jar,
        Json(RefreshResponse {
            session_id: refreshed.session_id,
            access_token: refreshed.access_token,
            access_expiry_utc: refreshed.access_expiry_utc,
        }),
    ))
}

/// Revoke every token of the caller. The session cookie stays so the next
/// sign-in on this device reactivates the same session.
///
/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth.logout(user.user_id, user.session_id).await?;
    tracing::info!(user_id = %user.user_id, "User logged out");
    Ok(Json(MessageResponse::new("Logged out")))
}
