use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use service_core::error::AppError;
use service_core::realtime::RealtimeMessage;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub receiver_id: Uuid,
    pub delivered: bool,
}

/// POST /internal/deliver
///
/// Takes the same `{type, message, receiverId}` payload the identity service
/// publishes. 404 means the receiver has no live connection here and the
/// caller should fall back to asynchronous delivery.
pub async fn deliver(
    State(state): State<AppState>,
    Json(message): Json<RealtimeMessage>,
) -> Result<(StatusCode, Json<DeliveryResponse>), AppError> {
    let receiver_id = Uuid::parse_str(&message.receiver_id)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("receiverId must be a user id")))?;

    state.registry.send(receiver_id, &message)?;

    tracing::info!(receiver_id = %receiver_id, kind = %message.kind, "Message delivered");
    Ok((
        StatusCode::ACCEPTED,
        Json(DeliveryResponse {
            receiver_id,
            delivered: true,
        }),
    ))
}
