//! One-time code issue and verification.
//!
//! Per code: issued -> consumed | expired | locked out. Mismatches below the
//! attempt ceiling leave the code issued.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::OtpConfig;
use crate::models::{OtpCode, OtpPurpose, User};
use crate::services::store::CodeStore;
use crate::services::{EmailProvider, ServiceError};
use crate::utils::{constant_time_eq, generate_numeric_code, hash_token};

#[derive(Clone)]
pub struct OtpManager {
    store: Arc<dyn CodeStore>,
    email: Arc<dyn EmailProvider>,
    expiry_seconds: i64,
    max_attempts: i32,
}

impl OtpManager {
    pub fn new(store: Arc<dyn CodeStore>, email: Arc<dyn EmailProvider>, config: &OtpConfig) -> Self {
        Self {
            store,
            email,
            expiry_seconds: config.expiry_seconds,
            max_attempts: config.max_attempts,
        }
    }

    /// Replace any live code for `user` with a fresh one and mail it.
    /// Returns the new code's expiry.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.user_id, purpose = purpose.as_str()))]
    pub async fn issue(
        &self,
        user: &User,
        purpose: OtpPurpose,
    ) -> Result<DateTime<Utc>, ServiceError> {
        let contact = user.email.clone().ok_or_else(|| {
            ServiceError::ValidationError("Account has no email address for codes".to_string())
        })?;

        let code = generate_numeric_code();
        let record = OtpCode::new(
            user.user_id,
            contact.clone(),
            purpose,
            hash_token(&code),
            self.expiry_seconds,
        );

        self.store.replace_code(&record).await?;

        match purpose {
            OtpPurpose::Login => self.email.send_login_code(&contact, &code).await?,
            OtpPurpose::PasswordReset => {
                self.email.send_password_reset_code(&contact, &code).await?
            }
        }

        tracing::info!(expiry_utc = %record.expiry_utc, "Verification code issued");
        Ok(record.expiry_utc)
    }

    /// Check a submitted code. Success consumes it. The attempt that reaches
    /// the ceiling deletes the code, deactivates the account and returns
    /// `AccountLocked`.
    #[tracing::instrument(skip(self, submitted), fields(user_id = %user_id, purpose = purpose.as_str()))]
    pub async fn verify(
        &self,
        user_id: uuid::Uuid,
        purpose: OtpPurpose,
        submitted: &str,
    ) -> Result<(), ServiceError> {
        let code = self
            .store
            .find_code(user_id)
            .await?
            .filter(|c| c.is_for(purpose))
            .ok_or(ServiceError::CodeNotFound)?;

        if code.is_expired() {
            self.store.consume_code(code.code_id).await?;
            tracing::info!("Verification code expired");
            return Err(ServiceError::CodeExpired);
        }

        if constant_time_eq(&hash_token(submitted.trim()), &code.code_hash) {
            // Another submission of the same code may have consumed it first
            if !self.store.consume_code(code.code_id).await? {
                tracing::info!("Verification code already consumed");
                return Err(ServiceError::CodeNotFound);
            }
            tracing::info!("Verification code accepted");
            return Ok(());
        }

        let attempts = self
            .store
            .increment_attempts(code.code_id)
            .await?
            .ok_or(ServiceError::CodeNotFound)?;

        if attempts >= self.max_attempts {
            self.store.lock_out(code.code_id, user_id).await?;
            tracing::warn!(attempts, "Verification attempts exhausted; account locked");
            return Err(ServiceError::AccountLocked);
        }

        tracing::info!(attempts, "Verification code mismatch");
        Err(ServiceError::InvalidCode)
    }

    /// Remove every expired code. Verification never depends on this running.
    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        self.store.delete_expired_codes(Utc::now()).await
    }
}
