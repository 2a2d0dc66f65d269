//! Opaque access and refresh token records.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Short-lived bearer credential.
#[derive(Debug, Clone, FromRow)]
pub struct AccessToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub is_active: bool,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(user_id: Uuid, token_hash: String, expiry_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash,
            is_active: true,
            expiry_utc: now + Duration::minutes(expiry_minutes),
            created_utc: now,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_active && self.expiry_utc > Utc::now()
    }
}

/// Long-lived credential exchanged for fresh access tokens.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub is_active: bool,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(user_id: Uuid, token_hash: String, expiry_days: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash,
            is_active: true,
            expiry_utc: now + Duration::days(expiry_days),
            created_utc: now,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_active && self.expiry_utc > Utc::now()
    }
}

/// Freshly minted credentials. The raw values exist only here and in the
/// response to the client.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expiry_utc: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expiry_utc: DateTime<Utc>,
    #[serde(skip)]
    pub refresh_token_id: Uuid,
}
