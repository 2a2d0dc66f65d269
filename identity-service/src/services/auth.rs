use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{DeviceContext, LoginIdentifier, OtpPurpose, Session, TokenPair, User};
use crate::services::credential::CredentialVerifier;
use crate::services::google::IdentityProvider;
use crate::services::otp::OtpManager;
use crate::services::session::SessionManager;
use crate::services::store::CredentialStore;
use crate::services::token::TokenIssuer;
use crate::services::ServiceError;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Password accepted; a code is on its way.
#[derive(Debug, Clone)]
pub struct LoginChallenge {
    pub user_id: Uuid,
    pub code_expiry_utc: DateTime<Utc>,
}

/// Result of a completed sign-in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub session: Session,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub session_id: Uuid,
    pub access_token: String,
    pub access_expiry_utc: DateTime<Utc>,
}

/// Drives the sign-in flows across the credential, code, token and session
/// components.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    credentials: CredentialVerifier,
    otp: OtpManager,
    tokens: TokenIssuer,
    sessions: SessionManager,
    identity_provider: Arc<dyn IdentityProvider>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        credentials: CredentialVerifier,
        otp: OtpManager,
        tokens: TokenIssuer,
        sessions: SessionManager,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            users,
            credentials,
            otp,
            tokens,
            sessions,
            identity_provider,
        }
    }

    // ==================== Sign-in ====================

    /// First factor. Never issues tokens.
    pub async fn login(
        &self,
        identifier: &LoginIdentifier,
        password: &Password,
    ) -> Result<LoginChallenge, ServiceError> {
        let user = self.credentials.verify(identifier, password).await?;
        let code_expiry_utc = self.otp.issue(&user, OtpPurpose::Login).await?;

        Ok(LoginChallenge {
            user_id: user.user_id,
            code_expiry_utc,
        })
    }

    /// Second factor. On success the presented session is reactivated when
    /// possible, otherwise a new one is opened.
    #[tracing::instrument(skip(self, code, device))]
    pub async fn verify_code(
        &self,
        email: &str,
        code: &str,
        device: &DeviceContext,
        presented_session: Option<Uuid>,
    ) -> Result<SignedIn, ServiceError> {
        let user = self
            .users
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::CodeNotFound)?;

        if !user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }

        self.verify_otp(user.user_id, OtpPurpose::Login, code).await?;
        self.complete_sign_in(user, device, presented_session).await
    }

    /// Federated sign-in skips the code step. Earlier tokens are revoked
    /// before the new pair is issued.
    #[tracing::instrument(skip(self, provider_token, device))]
    pub async fn google_login(
        &self,
        provider_token: &str,
        device: &DeviceContext,
        presented_session: Option<Uuid>,
    ) -> Result<SignedIn, ServiceError> {
        let identity = self.identity_provider.verify_token(provider_token).await?;
        let user = self.credentials.resolve_federated(&identity).await?;

        self.tokens.revoke_all(user.user_id).await?;
        self.complete_sign_in(user, device, presented_session).await
    }

    /// A lock-out also cuts the account off from everything it already
    /// holds: tokens go, and so do the cached projections the realtime
    /// handshake trusts.
    async fn verify_otp(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<(), ServiceError> {
        match self.otp.verify(user_id, purpose, code).await {
            Err(ServiceError::AccountLocked) => {
                self.tokens.revoke_all(user_id).await?;
                self.sessions.drop_projections(user_id).await?;
                Err(ServiceError::AccountLocked)
            }
            other => other,
        }
    }

    async fn complete_sign_in(
        &self,
        user: User,
        device: &DeviceContext,
        presented_session: Option<Uuid>,
    ) -> Result<SignedIn, ServiceError> {
        if let Some(session_id) = presented_session {
            match self.sessions.reactivate(session_id, &user).await {
                Ok((session, tokens)) => {
                    return Ok(SignedIn {
                        user,
                        session,
                        tokens,
                    })
                }
                Err(ServiceError::SessionNotFound | ServiceError::SessionNotReactivatable) => {
                    tracing::debug!(%session_id, "Presented session not reusable; opening a new one");
                }
                Err(e) => return Err(e),
            }
        }

        let (session, tokens) = self.sessions.create(&user, device).await?;
        Ok(SignedIn {
            user,
            session,
            tokens,
        })
    }

    // ==================== Token lifecycle ====================

    /// Rotate the access token. The presented session is kept alive when it
    /// still belongs to the user; otherwise a session is opened on the
    /// matched refresh token.
    #[tracing::instrument(skip(self, refresh_token, device))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        user_id: Uuid,
        device: &DeviceContext,
        presented_session: Option<Uuid>,
    ) -> Result<RefreshedAccess, ServiceError> {
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::InvalidRefreshToken)?;

        let rotated = self.tokens.rotate(refresh_token, user_id).await?;

        let reusable = match presented_session {
            Some(session_id) => self
                .sessions
                .find(session_id)
                .await?
                .filter(|s| s.user_id == user_id && !s.is_revoked()),
            None => None,
        };

        let session_id = match reusable {
            Some(session) => {
                self.sessions.touch(session.session_id).await?;
                session.session_id
            }
            None => {
                self.sessions
                    .open(&user, device, rotated.refresh_token_id)
                    .await?
                    .session_id
            }
        };

        Ok(RefreshedAccess {
            session_id,
            access_token: rotated.access_token,
            access_expiry_utc: rotated.access_expiry_utc,
        })
    }

    /// Revoke every token and park the current session as `inactive`.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid, session_id: Option<Uuid>) -> Result<(), ServiceError> {
        self.tokens.revoke_all(user_id).await?;

        if let Some(session_id) = session_id {
            match self.sessions.deactivate(session_id, user_id).await {
                Ok(()) | Err(ServiceError::SessionNotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ==================== Password ====================

    /// Unknown addresses succeed silently so the endpoint cannot be used to
    /// discover which accounts exist.
    #[tracing::instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        match self.users.find_user_by_email(email).await? {
            Some(user) if user.is_active => {
                self.otp.issue(&user, OtpPurpose::PasswordReset).await?;
            }
            _ => tracing::info!("Password reset requested for unknown or inactive account"),
        }
        Ok(())
    }

    /// Consume a reset code, store the new hash and revoke every token.
    #[tracing::instrument(skip(self, code, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::CodeNotFound)?;

        if !user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }

        self.verify_otp(user.user_id, OtpPurpose::PasswordReset, code)
            .await?;

        let hash = hash_blocking(new_password.clone()).await?;
        self.users
            .update_password_hash(user.user_id, hash.as_str())
            .await?;
        self.tokens.revoke_all(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "Password reset");
        Ok(())
    }

    /// Replace the password of a signed-in user. Tokens stay valid.
    #[tracing::instrument(skip(self, current, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &Password,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::InvalidCredentials)?;

        let Some(stored) = user.password_hash.clone() else {
            return Err(ServiceError::InvalidCredentials);
        };

        let current = current.clone();
        tokio::task::spawn_blocking(move || {
            verify_password(&current, &PasswordHashString::new(stored))
        })
        .await
        .map_err(|e| ServiceError::Internal(e.into()))?
        .map_err(|_| ServiceError::InvalidCredentials)?;

        let hash = hash_blocking(new_password.clone()).await?;
        self.users.update_password_hash(user_id, hash.as_str()).await?;

        tracing::info!(%user_id, "Password changed");
        Ok(())
    }
}

async fn hash_blocking(password: Password) -> Result<PasswordHashString, ServiceError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(e.into()))?
        .map_err(ServiceError::Internal)
}
