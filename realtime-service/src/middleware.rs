use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::AppState;

pub const DELIVERY_KEY_HEADER: &str = "x-delivery-key";

/// Guards internal endpoints with the shared delivery key.
pub async fn require_delivery_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(DELIVERY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing delivery key")))?;

    let expected = state.config.delivery.api_key.as_bytes();
    if !bool::from(provided.as_bytes().ct_eq(expected)) {
        tracing::warn!(path = %req.uri().path(), "Invalid delivery key");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid delivery key")));
    }

    Ok(next.run(req).await)
}
