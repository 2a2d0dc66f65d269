//! Types shared between the identity service, which writes session
//! projections and domain events, and the realtime service, which reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SESSION_KEY_PREFIX: &str = "session:";

/// Cache key of the projection for a session.
pub fn session_cache_key(session_id: Uuid) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

/// The slice of a session the realtime layer needs to authorise a handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProjection {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub username: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub created_utc: DateTime<Utc>,
    pub last_active_utc: DateTime<Utc>,
}

/// Frame exchanged with realtime clients and published to the event topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(rename = "receiverId", default)]
    pub receiver_id: String,
}

impl RealtimeMessage {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, receiver_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            receiver_id: receiver_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_uses_wire_field_names() {
        let msg = RealtimeMessage::new("like", "someone liked your post", "42");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "like");
        assert_eq!(json["receiverId"], "42");
    }

    #[test]
    fn test_message_receiver_is_optional_on_input() {
        let msg: RealtimeMessage =
            serde_json::from_str(r#"{"type":"ping","message":"hi"}"#).unwrap();
        assert_eq!(msg.kind, "ping");
        assert!(msg.receiver_id.is_empty());
    }

    #[test]
    fn test_session_cache_key() {
        let id = Uuid::nil();
        assert_eq!(
            session_cache_key(id),
            "session:00000000-0000-0000-0000-000000000000"
        );
    }
}
