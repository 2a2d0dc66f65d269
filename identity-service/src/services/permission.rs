//! Role -> permission checks with a positive-only read-through cache.

use service_core::cache::CacheStore;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::store::PermissionStore;
use crate::services::ServiceError;

const GRANTED: &str = "true";

pub fn permission_cache_key(role_id: Uuid, permission_name: &str) -> String {
    format!("permission:{}:{}", role_id, permission_name)
}

#[derive(Clone)]
pub struct PermissionCache {
    store: Arc<dyn PermissionStore>,
    cache: Arc<dyn CacheStore>,
    ttl_seconds: u64,
}

impl PermissionCache {
    pub fn new(store: Arc<dyn PermissionStore>, cache: Arc<dyn CacheStore>, ttl_seconds: u64) -> Self {
        Self {
            store,
            cache,
            ttl_seconds,
        }
    }

    /// Does `role_id` hold `permission_name`? Only grants are cached, so a
    /// new grant is visible on the next check. A revoked grant keeps
    /// answering `true` until its entry expires. Errors deny.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self, role_id: Uuid, permission_name: &str) -> bool {
        let key = permission_cache_key(role_id, permission_name);

        match self.cache.get(&key).await {
            Ok(Some(value)) if value == GRANTED => return true,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Permission cache read failed; using durable store");
            }
        }

        match self.lookup(role_id, permission_name).await {
            Ok(true) => {
                if let Err(e) = self.cache.set_ex(&key, GRANTED, self.ttl_seconds).await {
                    tracing::warn!(error = %e, "Failed to cache permission grant");
                }
                true
            }
            Ok(false) => {
                tracing::info!("Permission denied");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Permission lookup failed; denying");
                false
            }
        }
    }

    /// Drop a cached grant so the next check goes to the durable store.
    /// Nothing calls this on grant removal; operators use it explicitly.
    pub async fn invalidate(&self, role_id: Uuid, permission_name: &str) -> Result<(), ServiceError> {
        self.cache
            .delete(&permission_cache_key(role_id, permission_name))
            .await
            .map_err(ServiceError::Cache)
    }

    async fn lookup(&self, role_id: Uuid, permission_name: &str) -> Result<bool, ServiceError> {
        let Some(permission_id) = self.store.find_permission_id(permission_name).await? else {
            return Ok(false);
        };
        self.store.grant_exists(role_id, permission_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Permission;
    use crate::services::MemoryStore;
    use service_core::cache::MockCache;

    #[tokio::test]
    async fn test_denial_is_never_cached() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MockCache::new());
        let permissions = PermissionCache::new(store.clone(), cache.clone(), 3600);
        let role_id = Uuid::new_v4();
        let permission_id = store
            .insert_permission(Permission::new("notification:create"))
            .unwrap();

        assert!(!permissions.check(role_id, "notification:create").await);
        assert!(!cache.contains(&permission_cache_key(role_id, "notification:create")));

        store.grant(role_id, permission_id).unwrap();
        assert!(permissions.check(role_id, "notification:create").await);
        assert!(cache.contains(&permission_cache_key(role_id, "notification:create")));
    }

    #[tokio::test]
    async fn test_cached_grant_outlives_revocation_until_invalidated() {
        let store = Arc::new(MemoryStore::new());
        let permissions = PermissionCache::new(store.clone(), Arc::new(MockCache::new()), 3600);
        let role_id = Uuid::new_v4();
        let permission_id = store.insert_permission(Permission::new("report:read")).unwrap();
        store.grant(role_id, permission_id).unwrap();

        assert!(permissions.check(role_id, "report:read").await);
        store.revoke_grant(role_id, permission_id).unwrap();
        assert!(permissions.check(role_id, "report:read").await);

        permissions.invalidate(role_id, "report:read").await.unwrap();
        assert!(!permissions.check(role_id, "report:read").await);
    }

    #[tokio::test]
    async fn test_storage_failure_denies() {
        let store = Arc::new(MemoryStore::new());
        let permissions = PermissionCache::new(store.clone(), Arc::new(MockCache::new()), 3600);
        store.set_failing(true);
        assert!(!permissions.check(Uuid::new_v4(), "report:read").await);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_back_to_store() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MockCache::new());
        let permissions = PermissionCache::new(store.clone(), cache.clone(), 3600);
        let role_id = Uuid::new_v4();
        let permission_id = store.insert_permission(Permission::new("report:read")).unwrap();
        store.grant(role_id, permission_id).unwrap();

        cache.set_unavailable(true);
        assert!(permissions.check(role_id, "report:read").await);
    }
}
