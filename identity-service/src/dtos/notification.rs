use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNotificationRequest {
    pub recipient_id: Uuid,

    #[validate(length(min = 1, max = 64, message = "Kind must be 1-64 characters"))]
    pub kind: String,

    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters"))]
    pub message: String,
}
