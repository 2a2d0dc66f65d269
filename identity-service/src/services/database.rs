//! PostgreSQL implementation of the identity repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    AccessToken, DeviceSession, LoginIdentifier, Notification, OtpCode, RefreshToken, Session,
    SessionStatus, User,
};
use crate::services::store::{
    CodeStore, CredentialStore, IdentityStore, NotificationStore, PermissionStore, SessionStore,
    TokenStore,
};
use crate::services::ServiceError;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::from(e)
            })?;
        Ok(())
    }
}

// ==================== User Operations ====================

#[async_trait]
impl CredentialStore for Database {
    async fn find_active_user(
        &self,
        identifier: &LoginIdentifier,
    ) -> Result<Option<User>, ServiceError> {
        let sql = match identifier {
            LoginIdentifier::Email(_) => {
                "SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND is_active = TRUE LIMIT 1"
            }
            LoginIdentifier::Phone(_) => {
                "SELECT * FROM users WHERE phone = $1 AND is_active = TRUE LIMIT 1"
            }
            LoginIdentifier::Username(_) => {
                "SELECT * FROM users WHERE username = $1 AND is_active = TRUE LIMIT 1"
            }
        };

        let user = sqlx::query_as::<_, User>(sql)
            .bind(identifier.value())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_user_by_google_id(
        &self,
        google_id: &str,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = $1")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, phone, username, password_hash, google_id,
                               display_name, role_id, is_active, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.display_name)
        .bind(user.role_id)
        .bind(user.is_active)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_google_id(&self, user_id: Uuid, google_id: &str) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE users SET google_id = $1, updated_utc = NOW() WHERE user_id = $2 AND google_id IS NULL",
        )
        .bind(google_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_utc = NOW() WHERE user_id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_role_id_by_name(&self, role_name: &str) -> Result<Option<Uuid>, ServiceError> {
        let role_id: Option<Uuid> =
            sqlx::query_scalar("SELECT role_id FROM roles WHERE role_name = $1")
                .bind(role_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(role_id)
    }
}

// ==================== Verification Code Operations ====================

#[async_trait]
impl CodeStore for Database {
    async fn replace_code(&self, code: &OtpCode) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_codes WHERE user_id = $1")
            .bind(code.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO verification_codes (code_id, user_id, contact_email, purpose_code,
                                            code_hash, attempt_count, expiry_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(code.code_id)
        .bind(code.user_id)
        .bind(&code.contact_email)
        .bind(&code.purpose_code)
        .bind(&code.code_hash)
        .bind(code.attempt_count)
        .bind(code.expiry_utc)
        .bind(code.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_code(&self, user_id: Uuid) -> Result<Option<OtpCode>, ServiceError> {
        let code = sqlx::query_as::<_, OtpCode>(
            "SELECT * FROM verification_codes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(code)
    }

    async fn increment_attempts(&self, code_id: Uuid) -> Result<Option<i32>, ServiceError> {
        let count: Option<i32> = sqlx::query_scalar(
            "UPDATE verification_codes SET attempt_count = attempt_count + 1 WHERE code_id = $1 RETURNING attempt_count",
        )
        .bind(code_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }

    async fn consume_code(&self, code_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE code_id = $1")
            .bind(code_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn lock_out(&self, code_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_codes WHERE code_id = $1")
            .bind(code_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET is_active = FALSE, updated_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE expiry_utc < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ==================== Token Operations ====================

#[async_trait]
impl TokenStore for Database {
    async fn replace_token_pair(
        &self,
        access: &AccessToken,
        refresh: &RefreshToken,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;
        replace_pair(&mut tx, access, refresh).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn rotate_access_token(
        &self,
        refresh_hash: &str,
        user_id: Uuid,
        new_access: &AccessToken,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent rotations of the same refresh token
        let refresh = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE token_hash = $1 AND user_id = $2 AND is_active = TRUE AND expiry_utc > NOW()
            FOR UPDATE
            "#,
        )
        .bind(refresh_hash)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(refresh) = refresh else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM access_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        insert_access_token(&mut tx, new_access).await?;

        tx.commit().await?;
        Ok(Some(refresh))
    }

    async fn revoke_all_tokens(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM access_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_active_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, ServiceError> {
        let token = sqlx::query_as::<_, AccessToken>(
            "SELECT * FROM access_tokens WHERE token_hash = $1 AND is_active = TRUE AND expiry_utc > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }
}

async fn replace_pair(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    access: &AccessToken,
    refresh: &RefreshToken,
) -> Result<(), sqlx::Error> {
    // Lock the owner row so concurrent logins replace pairs one at a time
    sqlx::query("SELECT 1 FROM users WHERE user_id = $1 FOR UPDATE")
        .bind(access.user_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("DELETE FROM access_tokens WHERE user_id = $1")
        .bind(access.user_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
        .bind(refresh.user_id)
        .execute(&mut **tx)
        .await?;

    insert_access_token(tx, access).await?;

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (token_id, user_id, token_hash, is_active, expiry_utc, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(refresh.token_id)
    .bind(refresh.user_id)
    .bind(&refresh.token_hash)
    .bind(refresh.is_active)
    .bind(refresh.expiry_utc)
    .bind(refresh.created_utc)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_access_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    access: &AccessToken,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO access_tokens (token_id, user_id, token_hash, is_active, expiry_utc, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(access.token_id)
    .bind(access.user_id)
    .bind(&access.token_hash)
    .bind(access.is_active)
    .bind(access.expiry_utc)
    .bind(access.created_utc)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ==================== Session Operations ====================

#[async_trait]
impl SessionStore for Database {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions (session_id, user_id, ip_address, user_agent, refresh_token_id,
                                       status_code, last_active_utc, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.refresh_token_id)
        .bind(&session.status_code)
        .bind(session.last_active_utc)
        .bind(session.revoked_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM user_sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM user_sessions WHERE user_id = $1 ORDER BY last_active_utc DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn reactivate_session(
        &self,
        session_id: Uuid,
        access: &AccessToken,
        refresh: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET status_code = $1, refresh_token_id = $2, last_active_utc = $3
            WHERE session_id = $4 AND status_code = $5
            "#,
        )
        .bind(SessionStatus::Active.as_str())
        .bind(refresh.token_id)
        .bind(now)
        .bind(session_id)
        .bind(SessionStatus::Inactive.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        replace_pair(&mut tx, access, refresh).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn deactivate_session(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET status_code = $1 WHERE session_id = $2 AND status_code = $3",
        )
        .bind(SessionStatus::Inactive.as_str())
        .bind(session_id)
        .bind(SessionStatus::Active.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let revoked: Option<(Uuid, Option<Uuid>)> = sqlx::query_as(
            r#"
            UPDATE user_sessions SET status_code = $1, revoked_utc = $2
            WHERE session_id = $3 AND status_code <> $1
            RETURNING user_id, refresh_token_id
            "#,
        )
        .bind(SessionStatus::Revoked.as_str())
        .bind(now)
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, refresh_token_id)) = revoked else {
            tx.rollback().await?;
            return Ok(false);
        };

        if let Some(refresh_token_id) = refresh_token_id {
            let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE token_id = $1")
                .bind(refresh_token_id)
                .execute(&mut *tx)
                .await?;

            if deleted.rows_affected() == 1 {
                sqlx::query("DELETE FROM access_tokens WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET last_active_utc = $1 WHERE session_id = $2 AND status_code <> $3",
        )
        .bind(now)
        .bind(session_id)
        .bind(SessionStatus::Revoked.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_device_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<DeviceSession>, ServiceError> {
        let device = sqlx::query_as::<_, DeviceSession>(
            r#"
            SELECT s.session_id, s.user_id, u.is_active AS user_is_active, s.status_code
            FROM user_sessions s
            JOIN users u ON u.user_id = s.user_id
            WHERE s.user_id = $1 AND s.session_id = $2
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(device)
    }
}

// ==================== Permission Operations ====================

#[async_trait]
impl PermissionStore for Database {
    async fn find_permission_id(
        &self,
        permission_name: &str,
    ) -> Result<Option<Uuid>, ServiceError> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT permission_id FROM permissions WHERE permission_name = $1")
                .bind(permission_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    async fn grant_exists(&self, role_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM role_permissions WHERE role_id = $1 AND permission_id = $2)",
        )
        .bind(role_id)
        .bind(permission_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

// ==================== Notification Operations ====================

#[async_trait]
impl NotificationStore for Database {
    async fn insert_notification(&self, notification: &Notification) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (notification_id, actor_id, recipient_id, kind_code,
                                       message_text, is_read, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.notification_id)
        .bind(notification.actor_id)
        .bind(notification.recipient_id)
        .bind(&notification.kind_code)
        .bind(&notification.message_text)
        .bind(notification.is_read)
        .bind(notification.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
