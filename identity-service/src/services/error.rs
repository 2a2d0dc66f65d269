use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(anyhow::Error),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Verification code not found")]
    CodeNotFound,

    #[error("Verification code expired")]
    CodeExpired,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Account locked")]
    AccountLocked,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session cannot be reactivated")]
    SessionNotReactivatable,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Event publish failed: {0}")]
    Publish(anyhow::Error),

    #[error("Identity provider error: {0}")]
    Federation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Storage(anyhow::Error::new(err))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Storage(e) => AppError::DatabaseError(e),
            ServiceError::Cache(e) => AppError::InternalError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::CodeNotFound => {
                AppError::BadRequest(anyhow::anyhow!("Verification code not found"))
            }
            ServiceError::CodeExpired => {
                AppError::BadRequest(anyhow::anyhow!("Verification code expired"))
            }
            ServiceError::InvalidCode => {
                AppError::BadRequest(anyhow::anyhow!("Invalid verification code"))
            }
            ServiceError::AccountLocked => AppError::Locked(anyhow::anyhow!("Account locked")),
            ServiceError::InvalidRefreshToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            ServiceError::InvalidAccessToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::SessionNotFound => {
                AppError::NotFound(anyhow::anyhow!("Session not found"))
            }
            ServiceError::SessionNotReactivatable => {
                AppError::Conflict(anyhow::anyhow!("Session cannot be reactivated"))
            }
            ServiceError::PermissionDenied => {
                AppError::Forbidden(anyhow::anyhow!("Permission denied"))
            }
            ServiceError::EmailError(e) => AppError::EmailError(e),
            ServiceError::Publish(e) => AppError::BadGateway(e.to_string()),
            ServiceError::Federation(e) => {
                AppError::AuthError(anyhow::anyhow!("Identity provider rejected token: {}", e))
            }
            ServiceError::ValidationError(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}
