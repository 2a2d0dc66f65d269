use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            role_name: role_name.into(),
            created_utc: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Permission {
    pub permission_id: Uuid,
    pub permission_name: String,
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    pub fn new(permission_name: impl Into<String>) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            permission_name: permission_name.into(),
            created_utc: Utc::now(),
        }
    }
}
