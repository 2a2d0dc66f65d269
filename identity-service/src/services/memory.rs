//! In-process implementation of the identity repositories.
//!
//! All state sits behind one mutex, so every trait method is atomic with
//! respect to every other. Used by the test suite and for running the
//! service without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    AccessToken, DeviceSession, LoginIdentifier, Notification, OtpCode, Permission,
    RefreshToken, Role, Session, SessionStatus, User,
};
use crate::services::store::{
    CodeStore, CredentialStore, IdentityStore, NotificationStore, PermissionStore, SessionStore,
    TokenStore,
};
use crate::services::ServiceError;

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    grants: HashSet<(Uuid, Uuid)>,
    codes: HashMap<Uuid, OtpCode>,
    access_tokens: HashMap<Uuid, AccessToken>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    sessions: HashMap<Uuid, Session>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every repository call fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Storage(anyhow::anyhow!(
                "Memory store unavailable"
            )));
        }
        self.state
            .lock()
            .map_err(|e| ServiceError::Storage(anyhow::anyhow!("Memory store poisoned: {}", e)))
    }

    // ==================== Seeding and inspection ====================

    pub fn insert_role(&self, role: Role) -> Result<Uuid, ServiceError> {
        let id = role.role_id;
        self.lock()?.roles.insert(id, role);
        Ok(id)
    }

    pub fn insert_permission(&self, permission: Permission) -> Result<Uuid, ServiceError> {
        let id = permission.permission_id;
        self.lock()?.permissions.insert(id, permission);
        Ok(id)
    }

    pub fn grant(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), ServiceError> {
        self.lock()?.grants.insert((role_id, permission_id));
        Ok(())
    }

    pub fn revoke_grant(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), ServiceError> {
        self.lock()?.grants.remove(&(role_id, permission_id));
        Ok(())
    }

    pub fn code_count(&self, user_id: Uuid) -> Result<usize, ServiceError> {
        Ok(self
            .lock()?
            .codes
            .values()
            .filter(|c| c.user_id == user_id)
            .count())
    }

    /// Overwrite a stored code, e.g. to move its expiry into the past.
    pub fn put_code(&self, code: OtpCode) -> Result<(), ServiceError> {
        self.lock()?.codes.insert(code.code_id, code);
        Ok(())
    }

    pub fn access_token_count(&self, user_id: Uuid) -> Result<usize, ServiceError> {
        Ok(self
            .lock()?
            .access_tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_valid())
            .count())
    }

    pub fn refresh_token_count(&self, user_id: Uuid) -> Result<usize, ServiceError> {
        Ok(self
            .lock()?
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_valid())
            .count())
    }

    pub fn notifications(&self) -> Result<Vec<Notification>, ServiceError> {
        Ok(self.lock()?.notifications.clone())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_active_user(
        &self,
        identifier: &LoginIdentifier,
    ) -> Result<Option<User>, ServiceError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.is_active && identifier.matches(u))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    async fn find_user_by_google_id(
        &self,
        google_id: &str,
    ) -> Result<Option<User>, ServiceError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let duplicate = state.users.values().any(|u| {
            user.email.is_some()
                && u.email
                    .as_deref()
                    .zip(user.email.as_deref())
                    .is_some_and(|(a, b)| a.eq_ignore_ascii_case(b))
        });
        if duplicate {
            return Err(ServiceError::Storage(anyhow::anyhow!(
                "duplicate key value violates unique constraint \"users_email_key\""
            )));
        }
        state.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn link_google_id(&self, user_id: Uuid, google_id: &str) -> Result<(), ServiceError> {
        if let Some(user) = self.lock()?.users.get_mut(&user_id) {
            if user.google_id.is_none() {
                user.google_id = Some(google_id.to_string());
                user.updated_utc = Utc::now();
            }
        }
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        if let Some(user) = self.lock()?.users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn find_role_id_by_name(&self, role_name: &str) -> Result<Option<Uuid>, ServiceError> {
        Ok(self
            .lock()?
            .roles
            .values()
            .find(|r| r.role_name == role_name)
            .map(|r| r.role_id))
    }
}

#[async_trait]
impl CodeStore for MemoryStore {
    async fn replace_code(&self, code: &OtpCode) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state.codes.retain(|_, c| c.user_id != code.user_id);
        state.codes.insert(code.code_id, code.clone());
        Ok(())
    }

    async fn find_code(&self, user_id: Uuid) -> Result<Option<OtpCode>, ServiceError> {
        Ok(self
            .lock()?
            .codes
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn increment_attempts(&self, code_id: Uuid) -> Result<Option<i32>, ServiceError> {
        Ok(self.lock()?.codes.get_mut(&code_id).map(|c| {
            c.attempt_count += 1;
            c.attempt_count
        }))
    }

    async fn consume_code(&self, code_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.lock()?.codes.remove(&code_id).is_some())
    }

    async fn lock_out(&self, code_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state.codes.remove(&code_id);
        if let Some(user) = state.users.get_mut(&user_id) {
            user.is_active = false;
            user.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut state = self.lock()?;
        let before = state.codes.len();
        state.codes.retain(|_, c| !c.is_expired_at(now));
        Ok((before - state.codes.len()) as u64)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn replace_token_pair(
        &self,
        access: &AccessToken,
        refresh: &RefreshToken,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state.access_tokens.retain(|_, t| t.user_id != access.user_id);
        state.refresh_tokens.retain(|_, t| t.user_id != refresh.user_id);
        state.access_tokens.insert(access.token_id, access.clone());
        state.refresh_tokens.insert(refresh.token_id, refresh.clone());
        Ok(())
    }

    async fn rotate_access_token(
        &self,
        refresh_hash: &str,
        user_id: Uuid,
        new_access: &AccessToken,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        let mut state = self.lock()?;
        let refresh = state
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == refresh_hash && t.user_id == user_id && t.is_valid())
            .cloned();

        let Some(refresh) = refresh else {
            return Ok(None);
        };

        state.access_tokens.retain(|_, t| t.user_id != user_id);
        state
            .access_tokens
            .insert(new_access.token_id, new_access.clone());
        Ok(Some(refresh))
    }

    async fn revoke_all_tokens(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state.access_tokens.retain(|_, t| t.user_id != user_id);
        state.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok(())
    }

    async fn find_active_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, ServiceError> {
        Ok(self
            .lock()?
            .access_tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.is_valid())
            .cloned())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        self.lock()?
            .sessions
            .insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(self.lock()?.sessions.get(&session_id).cloned())
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let mut sessions: Vec<Session> = self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_active_utc.cmp(&a.last_active_utc));
        Ok(sessions)
    }

    async fn reactivate_session(
        &self,
        session_id: Uuid,
        access: &AccessToken,
        refresh: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.status() == SessionStatus::Inactive => {
                session.status_code = SessionStatus::Active.as_str().to_string();
                session.refresh_token_id = Some(refresh.token_id);
                session.last_active_utc = now;
            }
            _ => return Ok(false),
        }

        state.access_tokens.retain(|_, t| t.user_id != access.user_id);
        state.refresh_tokens.retain(|_, t| t.user_id != refresh.user_id);
        state.access_tokens.insert(access.token_id, access.clone());
        state.refresh_tokens.insert(refresh.token_id, refresh.clone());
        Ok(true)
    }

    async fn deactivate_session(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.status() == SessionStatus::Active => {
                session.status_code = SessionStatus::Inactive.as_str().to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        let (user_id, refresh_token_id) = match state.sessions.get_mut(&session_id) {
            Some(session) if !session.is_revoked() => {
                session.status_code = SessionStatus::Revoked.as_str().to_string();
                session.revoked_utc = Some(now);
                (session.user_id, session.refresh_token_id)
            }
            _ => return Ok(false),
        };

        let live_pair = refresh_token_id
            .and_then(|id| state.refresh_tokens.remove(&id))
            .is_some();
        if live_pair {
            state.access_tokens.retain(|_, t| t.user_id != user_id);
        }
        Ok(true)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&session_id) {
            Some(session) if !session.is_revoked() => {
                session.last_active_utc = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_device_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<DeviceSession>, ServiceError> {
        let state = self.lock()?;
        let Some(session) = state
            .sessions
            .get(&session_id)
            .filter(|s| s.user_id == user_id)
        else {
            return Ok(None);
        };
        let Some(user) = state.users.get(&user_id) else {
            return Ok(None);
        };

        Ok(Some(DeviceSession {
            session_id: session.session_id,
            user_id: session.user_id,
            user_is_active: user.is_active,
            status_code: session.status_code.clone(),
        }))
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn find_permission_id(
        &self,
        permission_name: &str,
    ) -> Result<Option<Uuid>, ServiceError> {
        Ok(self
            .lock()?
            .permissions
            .values()
            .find(|p| p.permission_name == permission_name)
            .map(|p| p.permission_id))
    }

    async fn grant_exists(&self, role_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.lock()?.grants.contains(&(role_id, permission_id)))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<(), ServiceError> {
        self.lock()?.notifications.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceContext, OtpPurpose};

    fn user() -> User {
        User::new("u1@example.com".to_string(), "hash".to_string(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_replace_code_keeps_single_row() {
        let store = MemoryStore::new();
        let user = user();
        store.insert_user(&user).await.unwrap();

        for digest in ["a", "b", "c"] {
            let code = OtpCode::new(
                user.user_id,
                "u1@example.com".to_string(),
                OtpPurpose::Login,
                digest.to_string(),
                180,
            );
            store.replace_code(&code).await.unwrap();
        }

        assert_eq!(store.code_count(user.user_id).unwrap(), 1);
        assert_eq!(store.find_code(user.user_id).await.unwrap().unwrap().code_hash, "c");
    }

    #[tokio::test]
    async fn test_revoked_session_is_terminal() {
        let store = MemoryStore::new();
        let session = Session::new(
            Uuid::new_v4(),
            &DeviceContext::new("127.0.0.1", "test"),
            Uuid::new_v4(),
        );
        store.insert_session(&session).await.unwrap();

        assert!(store.revoke_session(session.session_id, Utc::now()).await.unwrap());
        assert!(!store.revoke_session(session.session_id, Utc::now()).await.unwrap());
        let access = AccessToken::new(session.user_id, "access".to_string(), 120);
        let refresh = RefreshToken::new(session.user_id, "refresh".to_string(), 30);
        assert!(!store
            .reactivate_session(session.session_id, &access, &refresh, Utc::now())
            .await
            .unwrap());
        assert!(!store.touch_session(session.session_id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_deletes_linked_refresh_token() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let access = AccessToken::new(user_id, "access".to_string(), 120);
        let refresh = RefreshToken::new(user_id, "refresh".to_string(), 30);
        store.replace_token_pair(&access, &refresh).await.unwrap();

        let session = Session::new(
            user_id,
            &DeviceContext::new("127.0.0.1", "test"),
            refresh.token_id,
        );
        store.insert_session(&session).await.unwrap();

        assert!(store.revoke_session(session.session_id, Utc::now()).await.unwrap());
        assert_eq!(store.refresh_token_count(user_id).unwrap(), 0);
        assert_eq!(store.access_token_count(user_id).unwrap(), 0);
        assert!(store
            .rotate_access_token("refresh", user_id, &access)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reactivate_lost_to_revoke_keeps_existing_pair() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let live_access = AccessToken::new(user_id, "live-access".to_string(), 120);
        let live_refresh = RefreshToken::new(user_id, "live-refresh".to_string(), 30);
        store
            .replace_token_pair(&live_access, &live_refresh)
            .await
            .unwrap();

        let parked = Session::new(
            user_id,
            &DeviceContext::new("127.0.0.1", "test"),
            Uuid::new_v4(),
        );
        store.insert_session(&parked).await.unwrap();
        store.deactivate_session(parked.session_id).await.unwrap();
        store.revoke_session(parked.session_id, Utc::now()).await.unwrap();

        let access = AccessToken::new(user_id, "new-access".to_string(), 120);
        let refresh = RefreshToken::new(user_id, "new-refresh".to_string(), 30);
        assert!(!store
            .reactivate_session(parked.session_id, &access, &refresh, Utc::now())
            .await
            .unwrap());

        assert!(store
            .find_active_access_token("live-access")
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.refresh_token_count(user_id).unwrap(), 1);
        let parked = store.find_session(parked.session_id).await.unwrap().unwrap();
        assert!(parked.is_revoked());
    }

    #[tokio::test]
    async fn test_failing_store_reports_storage_error() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let err = store.find_user_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
    }
}
