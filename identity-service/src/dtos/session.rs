use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::Session;

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub status: String,
    pub last_active_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub current: bool,
}

impl SessionInfo {
    pub fn from_session(session: Session, current: Option<Uuid>) -> Self {
        Self {
            current: current == Some(session.session_id),
            status: session.status().as_str().to_string(),
            session_id: session.session_id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            last_active_utc: session.last_active_utc,
            revoked_utc: session.revoked_utc,
            created_utc: session.created_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceValidityResponse {
    pub session_id: Uuid,
    pub valid: bool,
}
