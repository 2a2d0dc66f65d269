//! One-time code model - second factor after a primary credential check.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What a code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

/// One-time code entity. The code itself is stored as a SHA-256 digest.
#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub code_id: Uuid,
    pub user_id: Uuid,
    pub contact_email: String,
    pub purpose_code: String,
    pub code_hash: String,
    pub attempt_count: i32,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl OtpCode {
    pub fn new(
        user_id: Uuid,
        contact_email: String,
        purpose: OtpPurpose,
        code_hash: String,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            code_id: Uuid::new_v4(),
            user_id,
            contact_email,
            purpose_code: purpose.as_str().to_string(),
            code_hash,
            attempt_count: 0,
            expiry_utc: now + Duration::seconds(ttl_seconds),
            created_utc: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_utc
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_for(&self, purpose: OtpPurpose) -> bool {
        self.purpose_code == purpose.as_str()
    }
}
