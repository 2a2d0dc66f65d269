use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::SanitizedUser;
use crate::services::SignedIn;

/// One of email, phone or username plus the password. When several
/// identifiers are sent, email wins, then phone.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_has_identifier"))]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(min = 3, max = 32, message = "Invalid phone number"))]
    pub phone: Option<String>,

    #[validate(length(min = 1, max = 64, message = "Invalid username"))]
    pub username: Option<String>,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

fn validate_has_identifier(req: &LoginRequest) -> Result<(), ValidationError> {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|v| !v.trim().is_empty());
    if present(&req.email) || present(&req.phone) || present(&req.username) {
        Ok(())
    } else {
        let mut err = ValidationError::new("identifier_required");
        err.message = Some("One of email, phone or username is required".into());
        Err(err)
    }
}

#[derive(Debug, Serialize)]
pub struct LoginChallengeResponse {
    pub message: String,
    pub code_expiry_utc: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GoogleLoginRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: SanitizedUser,
    pub session_id: Uuid,
    pub access_token: String,
    pub access_expiry_utc: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expiry_utc: DateTime<Utc>,
}

impl From<SignedIn> for LoginResponse {
    fn from(signed_in: SignedIn) -> Self {
        Self {
            user: signed_in.user.sanitized(),
            session_id: signed_in.session.session_id,
            access_token: signed_in.tokens.access_token,
            access_expiry_utc: signed_in.tokens.access_expiry_utc,
            refresh_token: signed_in.tokens.refresh_token,
            refresh_expiry_utc: signed_in.tokens.refresh_expiry_utc,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,

    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub session_id: Uuid,
    pub access_token: String,
    pub access_expiry_utc: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}
