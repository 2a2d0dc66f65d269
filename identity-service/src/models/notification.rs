//! Notification record persisted before the event is published.

use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::realtime::RealtimeMessage;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub notification_id: Uuid,
    pub actor_id: Uuid,
    pub recipient_id: Uuid,
    pub kind_code: String,
    pub message_text: String,
    pub is_read: bool,
    pub created_utc: DateTime<Utc>,
}

impl Notification {
    pub fn new(actor_id: Uuid, recipient_id: Uuid, kind: String, message: String) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            actor_id,
            recipient_id,
            kind_code: kind,
            message_text: message,
            is_read: false,
            created_utc: Utc::now(),
        }
    }

    /// Self-directed events are stored but never fanned out.
    pub fn targets_other_user(&self) -> bool {
        self.actor_id != self.recipient_id
    }

    pub fn to_message(&self) -> RealtimeMessage {
        RealtimeMessage::new(
            self.kind_code.clone(),
            self.message_text.clone(),
            self.recipient_id.to_string(),
        )
    }
}
