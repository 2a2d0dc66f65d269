use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{middleware::AuthUser, AppState};

/// Require the caller's role to hold `permission`. Runs after
/// [`auth_middleware`](crate::middleware::auth_middleware).
pub async fn require_permission(
    State(state): State<AppState>,
    permission: &'static str,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = req.extensions().get::<AuthUser>().copied().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Auth user missing from request extensions"
        ))
    })?;

    if !state.permissions.check(user.role_id, permission).await {
        tracing::warn!(
            user_id = %user.user_id,
            role_id = %user.role_id,
            required_permission = permission,
            "Insufficient permission"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing permission: {}",
            permission
        )));
    }

    Ok(next.run(req).await)
}
