//! Device sessions: durable record plus a cached projection for the realtime
//! handshake.
//!
//! ```text
//! create ──> active <──reactivate── inactive
//!              │  └──deactivate──────^  │
//!              └──revoke──> revoked <───┘
//! ```

use chrono::Utc;
use service_core::cache::CacheStore;
use service_core::realtime::session_cache_key;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{DeviceContext, Session, SessionStatus, TokenPair, User};
use crate::services::store::SessionStore;
use crate::services::token::TokenIssuer;
use crate::services::ServiceError;

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: Arc<dyn CacheStore>,
    tokens: TokenIssuer,
    projection_ttl_seconds: u64,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        cache: Arc<dyn CacheStore>,
        tokens: TokenIssuer,
        projection_ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            cache,
            tokens,
            projection_ttl_seconds,
        }
    }

    // ==================== Transitions ====================

    /// Issue a fresh pair and open a new `active` session bound to it.
    #[tracing::instrument(skip(self, user, device), fields(user_id = %user.user_id))]
    pub async fn create(
        &self,
        user: &User,
        device: &DeviceContext,
    ) -> Result<(Session, TokenPair), ServiceError> {
        let pair = self.tokens.issue_token_pair(user.user_id).await?;
        let session = self.open(user, device, pair.refresh_token_id).await?;
        Ok((session, pair))
    }

    /// Insert a new `active` session linked to an existing refresh token.
    pub async fn open(
        &self,
        user: &User,
        device: &DeviceContext,
        refresh_token_id: Uuid,
    ) -> Result<Session, ServiceError> {
        let session = Session::new(user.user_id, device, refresh_token_id);
        self.store.insert_session(&session).await?;

        tracing::info!(session_id = %session.session_id, "Session created");
        self.mirror(&session, user).await;
        Ok(session)
    }

    /// Bring an `inactive` session owned by `user` back to `active` with a
    /// fresh token pair under the same session id.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn reactivate(
        &self,
        session_id: Uuid,
        user: &User,
    ) -> Result<(Session, TokenPair), ServiceError> {
        let session = self.owned_session(session_id, user.user_id).await?;

        if session.status() != SessionStatus::Inactive {
            tracing::info!(status = session.status().as_str(), "Session not reactivatable");
            return Err(ServiceError::SessionNotReactivatable);
        }

        let minted = self.tokens.mint_pair(user.user_id);
        let now = Utc::now();

        // A concurrent revoke can win between the read and this update; the
        // current pair then stays in place
        if !self
            .store
            .reactivate_session(session_id, &minted.access, &minted.refresh, now)
            .await?
        {
            return Err(ServiceError::SessionNotReactivatable);
        }

        let pair = minted.pair;
        tracing::info!(refresh_token_id = %pair.refresh_token_id, "Token pair issued");

        let session = Session {
            status_code: SessionStatus::Active.as_str().to_string(),
            refresh_token_id: Some(pair.refresh_token_id),
            last_active_utc: now,
            ..session
        };

        tracing::info!("Session reactivated");
        self.mirror(&session, user).await;
        Ok((session, pair))
    }

    /// Revoke a session and drop its cached projection. Revoking an already
    /// revoked session succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, session_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        self.owned_session(session_id, user_id).await?;

        if self.store.revoke_session(session_id, Utc::now()).await? {
            tracing::info!("Session revoked");
        }

        self.cache
            .delete(&session_cache_key(session_id))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to drop cached session projection");
                ServiceError::Cache(e)
            })
    }

    /// `active` -> `inactive` on logout. The projection goes with it.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, session_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        self.owned_session(session_id, user_id).await?;

        if self.store.deactivate_session(session_id).await? {
            tracing::info!("Session deactivated");
        }

        if let Err(e) = self.cache.delete(&session_cache_key(session_id)).await {
            tracing::warn!(error = %e, "Failed to drop cached session projection");
        }
        Ok(())
    }

    /// Delete the cached projection of every session the user owns. Durable
    /// rows are left as they are.
    #[tracing::instrument(skip(self))]
    pub async fn drop_projections(&self, user_id: Uuid) -> Result<(), ServiceError> {
        for session in self.store.list_sessions(user_id).await? {
            self.cache
                .delete(&session_cache_key(session.session_id))
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to drop cached session projection");
                    ServiceError::Cache(e)
                })?;
        }
        tracing::info!("Cached session projections dropped");
        Ok(())
    }

    /// Bump last activity. Revoked or unknown sessions are `SessionNotFound`.
    pub async fn touch(&self, session_id: Uuid) -> Result<(), ServiceError> {
        if self.store.touch_session(session_id, Utc::now()).await? {
            Ok(())
        } else {
            Err(ServiceError::SessionNotFound)
        }
    }

    /// Bump last activity of a session owned by `user_id`. Foreign or unknown
    /// sessions are `SessionNotFound`; false when the session is revoked.
    pub async fn touch_owned(&self, session_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
        self.owned_session(session_id, user_id).await?;
        self.store.touch_session(session_id, Utc::now()).await
    }

    // ==================== Queries ====================

    /// Whether `session_id` belongs to `user_id`, the owner is active and the
    /// session is not revoked. Any storage error reads as invalid.
    #[tracing::instrument(skip(self))]
    pub async fn is_device_valid(&self, user_id: Uuid, session_id: Uuid) -> bool {
        match self.store.find_device_session(user_id, session_id).await {
            Ok(Some(device)) => device.is_valid(),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "Device validity lookup failed; denying");
                false
            }
        }
    }

    pub async fn find(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        self.store.find_session(session_id).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        self.store.list_sessions(user_id).await
    }

    async fn owned_session(&self, session_id: Uuid, user_id: Uuid) -> Result<Session, ServiceError> {
        self.store
            .find_session(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(ServiceError::SessionNotFound)
    }

    /// Best effort: the durable row is already committed, so a cache failure
    /// only delays realtime handshakes until the next mirror.
    async fn mirror(&self, session: &Session, user: &User) {
        let projection = session.projection(user);
        let payload = match serde_json::to_string(&projection) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize session projection");
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set_ex(
                &session_cache_key(session.session_id),
                &payload,
                self.projection_ttl_seconds,
            )
            .await
        {
            tracing::warn!(
                session_id = %session.session_id,
                error = %e,
                "Failed to mirror session projection"
            );
        }
    }
}
