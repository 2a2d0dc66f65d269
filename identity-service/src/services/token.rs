//! Opaque access/refresh token issue, rotation and revocation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::models::{AccessToken, RefreshToken, TokenPair};
use crate::services::store::TokenStore;
use crate::services::ServiceError;
use crate::utils::{generate_hex_token, hash_token};

/// A freshly rotated access token.
#[derive(Debug, Clone)]
pub struct RotatedAccess {
    pub access_token: String,
    pub access_expiry_utc: DateTime<Utc>,
    pub refresh_token_id: Uuid,
}

/// Stored records plus the plaintext values handed to the client.
#[derive(Debug, Clone)]
pub struct MintedPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
    pub pair: TokenPair,
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    access_expiry_minutes: i64,
    refresh_expiry_days: i64,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn TokenStore>, config: &TokenConfig) -> Self {
        Self {
            store,
            access_expiry_minutes: config.access_token_expiry_minutes,
            refresh_expiry_days: config.refresh_token_expiry_days,
        }
    }

    pub fn refresh_expiry_days(&self) -> i64 {
        self.refresh_expiry_days
    }

    /// Mint a new pair. Every earlier token of the user is deleted in the
    /// same transaction, so pairs never accumulate.
    #[tracing::instrument(skip(self))]
    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, ServiceError> {
        let minted = self.mint_pair(user_id);
        self.store
            .replace_token_pair(&minted.access, &minted.refresh)
            .await?;

        tracing::info!(refresh_token_id = %minted.refresh.token_id, "Token pair issued");
        Ok(minted.pair)
    }

    /// Generate a pair without storing it, for callers that persist it as
    /// part of a larger store operation.
    pub fn mint_pair(&self, user_id: Uuid) -> MintedPair {
        let access_value = generate_hex_token();
        let refresh_value = generate_hex_token();

        let access = AccessToken::new(user_id, hash_token(&access_value), self.access_expiry_minutes);
        let refresh =
            RefreshToken::new(user_id, hash_token(&refresh_value), self.refresh_expiry_days);

        let pair = TokenPair {
            access_token: access_value,
            access_expiry_utc: access.expiry_utc,
            refresh_token: refresh_value,
            refresh_expiry_utc: refresh.expiry_utc,
            refresh_token_id: refresh.token_id,
        };

        MintedPair {
            access,
            refresh,
            pair,
        }
    }

    /// Exchange a refresh token for a new access token. The refresh token must
    /// belong to `user_id`. Old access tokens are replaced atomically.
    #[tracing::instrument(skip(self, refresh_value))]
    pub async fn rotate(
        &self,
        refresh_value: &str,
        user_id: Uuid,
    ) -> Result<RotatedAccess, ServiceError> {
        let access_value = generate_hex_token();
        let access = AccessToken::new(user_id, hash_token(&access_value), self.access_expiry_minutes);

        let refresh = self
            .store
            .rotate_access_token(&hash_token(refresh_value), user_id, &access)
            .await?
            .ok_or_else(|| {
                tracing::info!("Refresh token rejected");
                ServiceError::InvalidRefreshToken
            })?;

        tracing::info!(refresh_token_id = %refresh.token_id, "Access token rotated");

        Ok(RotatedAccess {
            access_token: access_value,
            access_expiry_utc: access.expiry_utc,
            refresh_token_id: refresh.token_id,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.store.revoke_all_tokens(user_id).await?;
        tracing::info!("All tokens revoked");
        Ok(())
    }

    /// Resolve a bearer value to its live access token record.
    pub async fn authenticate(&self, access_value: &str) -> Result<AccessToken, ServiceError> {
        self.store
            .find_active_access_token(&hash_token(access_value))
            .await?
            .ok_or(ServiceError::InvalidAccessToken)
    }
}
