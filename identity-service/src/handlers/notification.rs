use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::notification::CreateNotificationRequest;
use crate::middleware::AuthUser;
use crate::models::Notification;
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /notifications
pub async fn create_notification(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let notification = state
        .notifications
        .notify(user.user_id, req.recipient_id, &req.kind, &req.message)
        .await?;

    Ok((StatusCode::CREATED, Json(notification)))
}
