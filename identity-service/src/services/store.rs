//! Repository seams between the service layer and durable storage.
//!
//! Every multi-step write named here runs as one atomic unit in each
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AccessToken, DeviceSession, LoginIdentifier, Notification, OtpCode, RefreshToken, Session,
    User,
};
use crate::services::ServiceError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// First active user matching the identifier.
    async fn find_active_user(
        &self,
        identifier: &LoginIdentifier,
    ) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Any status, matched case-insensitively.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_google_id(&self, google_id: &str)
        -> Result<Option<User>, ServiceError>;

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;

    async fn link_google_id(&self, user_id: Uuid, google_id: &str) -> Result<(), ServiceError>;

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError>;

    async fn find_role_id_by_name(&self, role_name: &str) -> Result<Option<Uuid>, ServiceError>;
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Delete every code for the owner, then insert `code`.
    async fn replace_code(&self, code: &OtpCode) -> Result<(), ServiceError>;

    async fn find_code(&self, user_id: Uuid) -> Result<Option<OtpCode>, ServiceError>;

    /// Atomically bump the counter; `None` if the code no longer exists.
    async fn increment_attempts(&self, code_id: Uuid) -> Result<Option<i32>, ServiceError>;

    /// Delete the code. True only for the caller whose delete removed the
    /// row, so at most one concurrent verification can succeed.
    async fn consume_code(&self, code_id: Uuid) -> Result<bool, ServiceError>;

    /// Delete the code and deactivate its owner.
    async fn lock_out(&self, code_id: Uuid, user_id: Uuid) -> Result<(), ServiceError>;

    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Delete every access and refresh token of the owner, then insert the pair.
    async fn replace_token_pair(
        &self,
        access: &AccessToken,
        refresh: &RefreshToken,
    ) -> Result<(), ServiceError>;

    /// Find the live refresh token matching both digest and owner, delete the
    /// owner's access tokens and insert `new_access`. Returns the matched
    /// refresh token, or `None` with nothing changed.
    async fn rotate_access_token(
        &self,
        refresh_hash: &str,
        user_id: Uuid,
        new_access: &AccessToken,
    ) -> Result<Option<RefreshToken>, ServiceError>;

    async fn revoke_all_tokens(&self, user_id: Uuid) -> Result<(), ServiceError>;

    /// Active and unexpired access token by digest.
    async fn find_active_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, ServiceError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError>;

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError>;

    /// `inactive` -> `active`, replacing the owner's token pair and relinking
    /// the session to the new refresh token in the same step. False with
    /// nothing changed when the session was not `inactive`.
    async fn reactivate_session(
        &self,
        session_id: Uuid,
        access: &AccessToken,
        refresh: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// `active` -> `inactive`. False when the session was not `active`.
    async fn deactivate_session(&self, session_id: Uuid) -> Result<bool, ServiceError>;

    /// Any non-revoked status -> `revoked`. The linked refresh token is
    /// deleted in the same step; when it was the owner's live one, the paired
    /// access token goes with it. False when already revoked.
    async fn revoke_session(&self, session_id: Uuid, now: DateTime<Utc>)
        -> Result<bool, ServiceError>;

    /// Bump last activity of a non-revoked session.
    async fn touch_session(&self, session_id: Uuid, now: DateTime<Utc>)
        -> Result<bool, ServiceError>;

    async fn find_device_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<DeviceSession>, ServiceError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find_permission_id(&self, permission_name: &str)
        -> Result<Option<Uuid>, ServiceError>;

    async fn grant_exists(&self, role_id: Uuid, permission_id: Uuid)
        -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> Result<(), ServiceError>;
}

/// Everything the service needs from durable storage.
#[async_trait]
pub trait IdentityStore:
    CredentialStore + CodeStore + TokenStore + SessionStore + PermissionStore + NotificationStore
{
    async fn health_check(&self) -> Result<(), ServiceError>;
}
