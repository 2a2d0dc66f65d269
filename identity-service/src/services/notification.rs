use std::sync::Arc;
use uuid::Uuid;

use crate::models::Notification;
use crate::services::publisher::EventPublisher;
use crate::services::store::NotificationStore;
use crate::services::ServiceError;

/// Persists notifications and fans out the ones aimed at someone else.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        publisher: Arc<dyn EventPublisher>,
        topic: String,
    ) -> Self {
        Self {
            store,
            publisher,
            topic,
        }
    }

    /// The row is committed before publishing and stays even when the
    /// publish fails; that failure still reaches the caller.
    #[tracing::instrument(skip(self, message))]
    pub async fn notify(
        &self,
        actor_id: Uuid,
        recipient_id: Uuid,
        kind: &str,
        message: &str,
    ) -> Result<Notification, ServiceError> {
        let notification =
            Notification::new(actor_id, recipient_id, kind.to_string(), message.to_string());
        self.store.insert_notification(&notification).await?;

        if !notification.targets_other_user() {
            return Ok(notification);
        }

        let payload = serde_json::to_string(&notification.to_message())
            .map_err(|e| ServiceError::Internal(e.into()))?;

        self.publisher
            .publish(&self.topic, &recipient_id.to_string(), &payload)
            .await
            .map_err(|e| {
                tracing::error!(
                    notification_id = %notification.notification_id,
                    error = %e,
                    "Failed to publish notification"
                );
                ServiceError::Publish(e)
            })?;

        tracing::info!(notification_id = %notification.notification_id, "Notification published");
        Ok(notification)
    }
}
