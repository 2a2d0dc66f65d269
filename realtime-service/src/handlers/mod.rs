pub mod deliver;
pub mod ws;

use service_core::error::AppError;

use crate::registry::RealtimeError;

impl From<RealtimeError> for AppError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::NotConnected(_) => AppError::NotFound(err.into()),
            RealtimeError::SendFailed(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            RealtimeError::Serialization(e) => AppError::InternalError(e.into()),
        }
    }
}
