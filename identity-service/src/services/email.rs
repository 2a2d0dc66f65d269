use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::services::ServiceError;

/// Out-of-band channel for one-time codes.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), ServiceError>;

    async fn send_password_reset_code(&self, to_email: &str, code: &str)
        -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: Option<SmtpTransport>,
    from_email: String,
    expiry_minutes: i64,
}

impl EmailService {
    pub fn new(
        config: &crate::config::SmtpConfig,
        code_expiry_seconds: i64,
    ) -> Result<Self, ServiceError> {
        let expiry_minutes = (code_expiry_seconds / 60).max(1);

        if !config.enabled {
            tracing::warn!("SMTP disabled; one-time codes will not be delivered");
            return Ok(Self {
                mailer: None,
                from_email: config.from_email.clone(),
                expiry_minutes,
            });
        }

        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| ServiceError::EmailError(e.to_string()))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer: Some(mailer),
            from_email: config.from_email.clone(),
            expiry_minutes,
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
    ) -> Result<(), ServiceError> {
        let Some(mailer) = self.mailer.clone() else {
            tracing::debug!(to = %to_email, subject = %subject, "SMTP disabled, email dropped");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| {
                        ServiceError::EmailError(e.to_string())
                    })?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| {
                    ServiceError::EmailError(e.to_string())
                })?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(plain_body)
            .map_err(|e| ServiceError::EmailError(e.to_string()))?;

        // SmtpTransport is blocking
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(ServiceError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), ServiceError> {
        let body = format!(
            "Your sign-in code is {}.\n\nIt expires in {} minutes. If you did not try to sign in, you can ignore this email.",
            code, self.expiry_minutes
        );
        self.send_email(to_email, "Your sign-in code", body).await
    }

    async fn send_password_reset_code(
        &self,
        to_email: &str,
        code: &str,
    ) -> Result<(), ServiceError> {
        let body = format!(
            "Your password reset code is {}.\n\nIt expires in {} minutes. If you did not request a reset, you can ignore this email.",
            code, self.expiry_minutes
        );
        self.send_email(to_email, "Reset your password", body).await
    }
}

/// A code captured by [`MockEmailService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub to_email: String,
    pub code: String,
    pub password_reset: bool,
}

/// Records every code instead of sending it.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentCode>>,
    failing: AtomicBool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn last_code_for(&self, to_email: &str) -> Option<String> {
        self.sent
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|s| s.to_email.eq_ignore_ascii_case(to_email))
            .map(|s| s.code.clone())
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, to_email: &str, code: &str, password_reset: bool) -> Result<(), ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::EmailError("mock transport failure".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock email mutex poisoned: {}", e)))?
            .push(SentCode {
                to_email: to_email.to_string(),
                code: code.to_string(),
                password_reset,
            });
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), ServiceError> {
        self.record(to_email, code, false)
    }

    async fn send_password_reset_code(
        &self,
        to_email: &str,
        code: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, code, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_service_creation() {
        let config = crate::config::SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: "mailer".to_string(),
            password: "secret".to_string(),
            from_email: "no-reply@example.com".to_string(),
            enabled: true,
        };

        assert!(EmailService::new(&config, 180).is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_last_code() {
        let email = MockEmailService::new();
        email.send_login_code("a@example.com", "111111").await.unwrap();
        email.send_login_code("a@example.com", "222222").await.unwrap();
        assert_eq!(email.last_code_for("a@example.com").as_deref(), Some("222222"));
        assert!(email.last_code_for("b@example.com").is_none());
    }
}
