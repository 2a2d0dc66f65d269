//! Process-local map from a signed-in user to their live connection.
//!
//! One connection per user: a new `register` replaces the previous handle.
//! Delivery is at most once and never retried.

use dashmap::DashMap;
use service_core::realtime::RealtimeMessage;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("User {0} is not connected")]
    NotConnected(Uuid),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write to connection: {0}")]
    SendFailed(String),
}

/// Write side of one live connection. Frames are queued to the connection's
/// writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: Uuid,
    sender: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            sender,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queue a frame without waiting. A full buffer is a failed write.
    pub fn push(&self, frame: String) -> Result<(), RealtimeError> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => RealtimeError::SendFailed("outbound buffer full".to_string()),
            TrySendError::Closed(_) => RealtimeError::SendFailed("connection closed".to_string()),
        })
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub trait ConnectionRegistry: Send + Sync {
    /// Returns the handle this registration replaced, if any.
    fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle>;

    /// Removes whatever is registered for the user. Idempotent.
    fn unregister(&self, user_id: Uuid) -> bool;

    /// Removes the user's entry only while it still belongs to `connection_id`,
    /// so a closing connection cannot evict the one that replaced it.
    fn unregister_connection(&self, user_id: Uuid, connection_id: Uuid) -> bool;

    fn send(&self, user_id: Uuid, message: &RealtimeMessage) -> Result<(), RealtimeError>;

    fn is_connected(&self, user_id: Uuid) -> bool;

    fn connected_count(&self) -> usize;
}

/// `DashMap` backed registry. Each shard has its own reader/writer lock, so
/// lookups for different users do not contend.
#[derive(Default)]
pub struct ShardedRegistry {
    connections: DashMap<Uuid, ConnectionHandle>,
}

impl ShardedRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for ShardedRegistry {
    fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let connection_id = handle.connection_id();
        let replaced = self.connections.insert(user_id, handle);

        if let Some(previous) = &replaced {
            tracing::info!(
                user_id = %user_id,
                connection_id = %connection_id,
                replaced_connection_id = %previous.connection_id(),
                "Connection replaced"
            );
        } else {
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "Connection registered");
        }

        replaced
    }

    fn unregister(&self, user_id: Uuid) -> bool {
        let removed = self.connections.remove(&user_id).is_some();
        if removed {
            tracing::info!(user_id = %user_id, "Connection unregistered");
        }
        removed
    }

    fn unregister_connection(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let removed = self
            .connections
            .remove_if(&user_id, |_, handle| handle.connection_id() == connection_id)
            .is_some();
        if removed {
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    fn send(&self, user_id: Uuid, message: &RealtimeMessage) -> Result<(), RealtimeError> {
        // Clone out so the shard lock is not held across the write
        let handle = self
            .connections
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .ok_or(RealtimeError::NotConnected(user_id))?;

        let frame = serde_json::to_string(message)?;

        handle.push(frame).map_err(|e| {
            if handle.is_closed() {
                self.unregister_connection(user_id, handle.connection_id());
            }
            tracing::warn!(
                user_id = %user_id,
                connection_id = %handle.connection_id(),
                error = %e,
                "Delivery failed"
            );
            e
        })
    }

    fn is_connected(&self, user_id: Uuid) -> bool {
        self.connections.contains_key(&user_id)
    }

    fn connected_count(&self) -> usize {
        self.connections.len()
    }
}
