use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::services::ServiceError;

/// What an external provider vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a provider access token for the identity it belongs to.
    async fn verify_token(&self, token: &str) -> Result<FederatedIdentity, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
}

#[derive(Clone)]
pub struct GoogleIdentityProvider {
    client: reqwest::Client,
    userinfo_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(userinfo_url: String) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Internal(e.into()))?;
        Ok(Self {
            client,
            userinfo_url,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    #[tracing::instrument(skip_all)]
    async fn verify_token(&self, token: &str) -> Result<FederatedIdentity, ServiceError> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Google userinfo request failed");
                ServiceError::Federation(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::info!(status = %response.status(), "Google rejected token");
            return Err(ServiceError::Federation(format!(
                "userinfo returned {}",
                response.status()
            )));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| ServiceError::Federation(e.to_string()))?;

        let email = match (info.email, info.email_verified) {
            (Some(email), Some(true)) => email,
            _ => {
                return Err(ServiceError::Federation(
                    "Google account has no verified email".to_string(),
                ))
            }
        };

        Ok(FederatedIdentity {
            subject: info.sub,
            email,
            name: info.name,
        })
    }
}

/// Accepts only tokens registered with [`MockIdentityProvider::register`].
#[derive(Default)]
pub struct MockIdentityProvider {
    identities: Mutex<HashMap<String, FederatedIdentity>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: &str, identity: FederatedIdentity) {
        if let Ok(mut identities) = self.identities.lock() {
            identities.insert(token.to_string(), identity);
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<FederatedIdentity, ServiceError> {
        self.identities
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock provider poisoned: {}", e)))?
            .get(token)
            .cloned()
            .ok_or_else(|| ServiceError::Federation("unknown token".to_string()))
    }
}
