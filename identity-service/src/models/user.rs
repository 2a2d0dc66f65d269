//! User model - the credential record every session and token is scoped to.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity. Deactivated rather than deleted.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub display_name: Option<String>,
    pub role_id: Uuid,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a password-backed user.
    pub fn new(email: String, password_hash: String, role_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: Some(email),
            phone: None,
            username: None,
            password_hash: Some(password_hash),
            google_id: None,
            display_name: None,
            role_id,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create a user that only signs in through Google.
    pub fn new_federated(
        email: String,
        google_id: String,
        display_name: Option<String>,
        role_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: Some(email),
            phone: None,
            username: None,
            password_hash: None,
            google_id: Some(google_id),
            display_name,
            role_id,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            user_id: self.user_id,
            email: self.email.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            created_utc: self.created_utc,
        }
    }
}

/// User fields safe to return to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// The identifier a client logs in with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Email(String),
    Phone(String),
    Username(String),
}

impl LoginIdentifier {
    /// Pick one identifier from whatever the client supplied. Email wins over
    /// phone, phone over username. Blank values count as absent.
    pub fn from_parts(
        email: Option<&str>,
        phone: Option<&str>,
        username: Option<&str>,
    ) -> Option<Self> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(email) = present(email) {
            return Some(LoginIdentifier::Email(email.to_lowercase()));
        }
        if let Some(phone) = present(phone) {
            return Some(LoginIdentifier::Phone(phone.to_string()));
        }
        present(username).map(|u| LoginIdentifier::Username(u.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LoginIdentifier::Email(_) => "email",
            LoginIdentifier::Phone(_) => "phone",
            LoginIdentifier::Username(_) => "username",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            LoginIdentifier::Email(v) | LoginIdentifier::Phone(v) | LoginIdentifier::Username(v) => v,
        }
    }

    /// Whether this identifier names `user`.
    pub fn matches(&self, user: &User) -> bool {
        match self {
            LoginIdentifier::Email(v) => user
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(v)),
            LoginIdentifier::Phone(v) => user.phone.as_deref() == Some(v.as_str()),
            LoginIdentifier::Username(v) => user.username.as_deref() == Some(v.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_precedence() {
        let id = LoginIdentifier::from_parts(Some("A@x.io"), Some("+100"), Some("alice"));
        assert_eq!(id, Some(LoginIdentifier::Email("a@x.io".to_string())));

        let id = LoginIdentifier::from_parts(None, Some("+100"), Some("alice"));
        assert_eq!(id, Some(LoginIdentifier::Phone("+100".to_string())));

        let id = LoginIdentifier::from_parts(Some("  "), None, Some("alice"));
        assert_eq!(id, Some(LoginIdentifier::Username("alice".to_string())));

        assert_eq!(LoginIdentifier::from_parts(None, None, None), None);
    }

    #[test]
    fn test_identifier_matches_user() {
        let user = User::new("alice@example.com".to_string(), "hash".to_string(), Uuid::new_v4())
            .with_username("alice");
        assert!(LoginIdentifier::Email("ALICE@example.com".to_string()).matches(&user));
        assert!(LoginIdentifier::Username("alice".to_string()).matches(&user));
        assert!(!LoginIdentifier::Phone("+1".to_string()).matches(&user));
    }
}
