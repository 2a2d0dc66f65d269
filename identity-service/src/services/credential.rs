//! Primary credential checks: password login and federated sign-in.

use std::sync::Arc;

use crate::models::{LoginIdentifier, User};
use crate::services::google::FederatedIdentity;
use crate::services::store::CredentialStore;
use crate::services::ServiceError;
use crate::utils::password::verify_against_dummy;
use crate::utils::{verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    default_role_name: String,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn CredentialStore>, default_role_name: String) -> Self {
        Self {
            store,
            default_role_name,
        }
    }

    /// Resolve an active user and check the secret. Unknown users, inactive
    /// users, users without a password and wrong passwords all produce the
    /// same `InvalidCredentials`.
    #[tracing::instrument(skip(self, secret), fields(identifier_kind = identifier.kind()))]
    pub async fn verify(
        &self,
        identifier: &LoginIdentifier,
        secret: &Password,
    ) -> Result<User, ServiceError> {
        let user = self.store.find_active_user(identifier).await?;

        let Some(user) = user else {
            verify_against_dummy(secret);
            tracing::info!("Login rejected");
            return Err(ServiceError::InvalidCredentials);
        };

        let Some(hash) = user.password_hash.clone() else {
            verify_against_dummy(secret);
            tracing::info!(user_id = %user.user_id, "Login rejected: no password set");
            return Err(ServiceError::InvalidCredentials);
        };

        let secret = secret.clone();
        let verified = tokio::task::spawn_blocking(move || {
            verify_password(&secret, &PasswordHashString::new(hash))
        })
        .await
        .map_err(|e| ServiceError::Internal(e.into()))?;

        if verified.is_err() {
            tracing::info!(user_id = %user.user_id, "Login rejected");
            return Err(ServiceError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Resolve the identity behind a verified federated token: match by
    /// provider subject, then by email (linking the subject on first use),
    /// otherwise create a user with the default role.
    #[tracing::instrument(skip(self, identity), fields(email = %identity.email))]
    pub async fn resolve_federated(
        &self,
        identity: &FederatedIdentity,
    ) -> Result<User, ServiceError> {
        if let Some(user) = self.store.find_user_by_google_id(&identity.subject).await? {
            return active_or_reject(user);
        }

        if let Some(mut user) = self.store.find_user_by_email(&identity.email).await? {
            if user.google_id.is_none() {
                self.store
                    .link_google_id(user.user_id, &identity.subject)
                    .await?;
                user.google_id = Some(identity.subject.clone());
                tracing::info!(user_id = %user.user_id, "Linked Google account to existing user");
            }
            return active_or_reject(user);
        }

        let role_id = self
            .store
            .find_role_id_by_name(&self.default_role_name)
            .await?
            .ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!(
                    "Default role '{}' does not exist",
                    self.default_role_name
                ))
            })?;

        let user = User::new_federated(
            identity.email.to_lowercase(),
            identity.subject.clone(),
            identity.name.clone(),
            role_id,
        );
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.user_id, "User created from Google sign-in");
        Ok(user)
    }
}

fn active_or_reject(user: User) -> Result<User, ServiceError> {
    if user.is_active {
        Ok(user)
    } else {
        tracing::info!(user_id = %user.user_id, "Federated login rejected: account inactive");
        Err(ServiceError::InvalidCredentials)
    }
}
