//! Device session model and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::realtime::SessionProjection;
use sqlx::FromRow;
use uuid::Uuid;

use super::User;

/// `revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Inactive,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
            SessionStatus::Revoked => "revoked",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(SessionStatus::Active),
            "inactive" => Some(SessionStatus::Inactive),
            "revoked" => Some(SessionStatus::Revoked),
            _ => None,
        }
    }
}

/// Originating network address and client agent of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub ip_address: String,
    pub user_agent: String,
}

impl DeviceContext {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Session entity.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub refresh_token_id: Option<Uuid>,
    pub status_code: String,
    pub last_active_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Session {
    /// Create a new session in `active`.
    pub fn new(user_id: Uuid, device: &DeviceContext, refresh_token_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            ip_address: device.ip_address.clone(),
            user_agent: device.user_agent.clone(),
            refresh_token_id: Some(refresh_token_id),
            status_code: SessionStatus::Active.as_str().to_string(),
            last_active_utc: now,
            revoked_utc: None,
            created_utc: now,
        }
    }

    /// Unknown status codes read as `revoked` so they never authorise anything.
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_code(&self.status_code).unwrap_or(SessionStatus::Revoked)
    }

    pub fn is_revoked(&self) -> bool {
        self.status() == SessionStatus::Revoked
    }

    pub fn projection(&self, user: &User) -> SessionProjection {
        SessionProjection {
            session_id: self.session_id,
            user_id: self.user_id,
            email: user.email.clone(),
            username: user.username.clone(),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            created_utc: self.created_utc,
            last_active_utc: self.last_active_utc,
        }
    }
}

/// Result of joining a session with its owner for device checks.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub user_is_active: bool,
    pub status_code: String,
}

impl DeviceSession {
    pub fn is_valid(&self) -> bool {
        self.user_is_active
            && SessionStatus::from_code(&self.status_code)
                .is_some_and(|status| status != SessionStatus::Revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_active() {
        let device = DeviceContext::new("10.0.0.1", "curl/8.0");
        let session = Session::new(Uuid::new_v4(), &device, Uuid::new_v4());
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.revoked_utc.is_none());
    }

    #[test]
    fn test_unknown_status_reads_as_revoked() {
        let device = DeviceContext::new("10.0.0.1", "curl/8.0");
        let mut session = Session::new(Uuid::new_v4(), &device, Uuid::new_v4());
        session.status_code = "paused".to_string();
        assert!(session.is_revoked());
    }

    #[test]
    fn test_device_session_validity() {
        let mut device = DeviceSession {
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_is_active: true,
            status_code: "inactive".to_string(),
        };
        assert!(device.is_valid());

        device.status_code = "revoked".to_string();
        assert!(!device.is_valid());
    }
}
