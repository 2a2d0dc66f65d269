use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::auth::{
    ChangePasswordRequest, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest,
};
use crate::middleware::AuthUser;
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

/// POST /auth/password/forgot
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .auth
        .forgot_password(&req.email.to_lowercase())
        .await?;

    Ok(Json(MessageResponse::new(
        "If the account exists, a reset code has been sent",
    )))
}

/// POST /auth/password/reset
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .auth
        .reset_password(
            &req.email.to_lowercase(),
            &req.code,
            &Password::new(req.new_password),
        )
        .await?;

    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// POST /auth/password/change
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .auth
        .change_password(
            user.user_id,
            &Password::new(req.current_password),
            &Password::new(req.new_password),
        )
        .await?;

    Ok(Json(MessageResponse::new("Password changed")))
}
