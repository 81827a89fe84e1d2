//! Read-through TTL cache in front of the permission store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{PermissionStore, PermissionStoreError};
use super::{Action, Module};
use crate::auth::Role;
use crate::config::PermissionCacheConfig;

type Key = (Role, Module, Action);

#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Stored decision for the triple; `None` when no row exists.
    async fn get(
        &self,
        role: Role,
        module: Module,
        action: Action,
    ) -> Result<Option<bool>, PermissionStoreError>;

    /// Drop every cached decision.
    fn invalidate_all(&self);
}

#[derive(Clone)]
pub struct TtlPermissionCache {
    enabled: bool,
    ttl: Duration,
    store: Arc<dyn PermissionStore>,
    inner: Arc<DashMap<Key, CachedPermission>>,
    generation: Arc<AtomicU64>,
}

#[derive(Clone, Copy)]
struct CachedPermission {
    inserted_at: Instant,
    generation: u64,
    permitted: Option<bool>,
}

impl TtlPermissionCache {
    pub fn new(store: Arc<dyn PermissionStore>, enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            store,
            inner: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(store: Arc<dyn PermissionStore>, cfg: &PermissionCacheConfig) -> Self {
        Self::new(
            store,
            cfg.enabled && cfg.ttl_secs > 0,
            Duration::from_secs(cfg.ttl_secs),
        )
    }

    /// Entries written before the last invalidation, or at/after the TTL, are never served.
    fn fresh(&self, key: &Key, now: Instant) -> Option<Option<bool>> {
        let entry = self.inner.get(key)?;
        let current = self.generation.load(Ordering::Acquire);
        if entry.generation == current && now.saturating_duration_since(entry.inserted_at) < self.ttl {
            Some(entry.permitted)
        } else {
            None
        }
    }
}

#[async_trait]
impl PermissionCache for TtlPermissionCache {
    async fn get(
        &self,
        role: Role,
        module: Module,
        action: Action,
    ) -> Result<Option<bool>, PermissionStoreError> {
        if !self.enabled {
            return self.store.find_permission(role, module, action).await;
        }

        let key = (role, module, action);
        if let Some(permitted) = self.fresh(&key, Instant::now()) {
            return Ok(permitted);
        }

        // Tag with the generation seen before the read, so a concurrent
        // invalidation makes this entry unservable.
        let generation = self.generation.load(Ordering::Acquire);
        let permitted = self.store.find_permission(role, module, action).await?;
        self.inner.insert(
            key,
            CachedPermission {
                inserted_at: Instant::now(),
                generation,
                permitted,
            },
        );
        Ok(permitted)
    }

    fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::control_db::ControlDb;
    use crate::permissions::store::Result as StoreResult;
    use crate::permissions::{PermissionGrant, PermissionTuple, RoleGrant, SqlitePermissionStore};

    /// Wraps a store and counts `find_permission` calls.
    pub(crate) struct CountingStore {
        pub inner: SqlitePermissionStore,
        pub lookups: AtomicUsize,
    }

    impl CountingStore {
        pub fn new() -> Self {
            Self {
                inner: SqlitePermissionStore::new(Arc::new(ControlDb::in_memory().unwrap())),
                lookups: AtomicUsize::new(0),
            }
        }

        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionStore for CountingStore {
        async fn find_permission(
            &self,
            role: Role,
            module: Module,
            action: Action,
        ) -> StoreResult<Option<bool>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_permission(role, module, action).await
        }
        async fn get(&self, id: i64) -> StoreResult<Option<PermissionTuple>> {
            self.inner.get(id).await
        }
        async fn list_all(&self) -> StoreResult<Vec<PermissionTuple>> {
            self.inner.list_all().await
        }
        async fn list_for_role(
            &self,
            role: Role,
        ) -> StoreResult<Vec<PermissionTuple>> {
            self.inner.list_for_role(role).await
        }
        async fn set_permitted(
            &self,
            id: i64,
            permitted: bool,
        ) -> StoreResult<PermissionTuple> {
            self.inner.set_permitted(id, permitted).await
        }
        async fn create(
            &self,
            grant: PermissionGrant,
        ) -> StoreResult<PermissionTuple> {
            self.inner.create(grant).await
        }
        async fn delete(&self, id: i64) -> StoreResult<()> {
            self.inner.delete(id).await
        }
        async fn delete_all_for_role(&self, role: Role) -> StoreResult<usize> {
            self.inner.delete_all_for_role(role).await
        }
        async fn replace_all_for_role(
            &self,
            role: Role,
            grants: &[RoleGrant],
        ) -> StoreResult<Vec<PermissionTuple>> {
            self.inner.replace_all_for_role(role, grants).await
        }
        async fn reset_to_defaults(
            &self,
        ) -> StoreResult<Vec<PermissionTuple>> {
            self.inner.reset_to_defaults().await
        }
        async fn seed_defaults_if_empty(&self) -> StoreResult<bool> {
            self.inner.seed_defaults_if_empty().await
        }
    }

    fn cache_over(store: Arc<CountingStore>, ttl: Duration) -> TtlPermissionCache {
        TtlPermissionCache::new(store, true, ttl)
    }

    #[tokio::test]
    async fn hit_avoids_store() {
        let store = Arc::new(CountingStore::new());
        store.reset_to_defaults().await.unwrap();
        let cache = cache_over(store.clone(), Duration::from_secs(300));

        for _ in 0..3 {
            assert_eq!(
                cache.get(Role::Student, Module::Payments, Action::View).await.unwrap(),
                Some(true)
            );
        }
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn absence_is_cached_too() {
        let store = Arc::new(CountingStore::new());
        let cache = cache_over(store.clone(), Duration::from_secs(300));

        assert_eq!(cache.get(Role::Student, Module::Users, Action::Delete).await.unwrap(), None);
        assert_eq!(cache.get(Role::Student, Module::Users, Action::Delete).await.unwrap(), None);
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_fresh_read() {
        let store = Arc::new(CountingStore::new());
        let cache = cache_over(store.clone(), Duration::from_secs(300));

        assert_eq!(cache.get(Role::FrontDesk, Module::Users, Action::View).await.unwrap(), None);
        store
            .create(PermissionGrant {
                role: Role::FrontDesk,
                module: Module::Users,
                action: Action::View,
                permitted: true,
            })
            .await
            .unwrap();

        // Stale until invalidated.
        assert_eq!(cache.get(Role::FrontDesk, Module::Users, Action::View).await.unwrap(), None);
        cache.invalidate_all();
        assert!(cache.inner.is_empty());
        assert_eq!(
            cache.get(Role::FrontDesk, Module::Users, Action::View).await.unwrap(),
            Some(true)
        );
        assert_eq!(store.lookups(), 2);
    }

    #[test]
    fn entry_is_not_served_at_or_past_ttl() {
        let store = Arc::new(CountingStore::new());
        let cache = cache_over(store, Duration::from_secs(300));
        let key = (Role::Student, Module::Payments, Action::View);
        let inserted_at = Instant::now();
        cache.inner.insert(
            key,
            CachedPermission {
                inserted_at,
                generation: 0,
                permitted: Some(true),
            },
        );

        assert_eq!(cache.fresh(&key, inserted_at + Duration::from_secs(299)), Some(Some(true)));
        assert_eq!(cache.fresh(&key, inserted_at + Duration::from_secs(300)), None);
        assert_eq!(cache.fresh(&key, inserted_at + Duration::from_secs(301)), None);
    }

    #[test]
    fn entry_from_older_generation_is_ignored() {
        let store = Arc::new(CountingStore::new());
        let cache = cache_over(store, Duration::from_secs(300));
        let key = (Role::Student, Module::Payments, Action::View);
        cache.generation.fetch_add(1, Ordering::SeqCst);
        cache.inner.insert(
            key,
            CachedPermission {
                inserted_at: Instant::now(),
                generation: 0,
                permitted: Some(true),
            },
        );
        assert_eq!(cache.fresh(&key, Instant::now()), None);
    }

    #[tokio::test]
    async fn expired_entry_rereads_store() {
        let store = Arc::new(CountingStore::new());
        let cache = cache_over(store.clone(), Duration::from_millis(20));

        cache.get(Role::Student, Module::Reports, Action::View).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get(Role::Student, Module::Reports, Action::View).await.unwrap();
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_reads_store() {
        let store = Arc::new(CountingStore::new());
        let cache = TtlPermissionCache::from_config(
            store.clone(),
            &PermissionCacheConfig {
                enabled: false,
                ttl_secs: 300,
            },
        );
        cache.get(Role::Student, Module::Reports, Action::View).await.unwrap();
        cache.get(Role::Student, Module::Reports, Action::View).await.unwrap();
        assert_eq!(store.lookups(), 2);
        assert!(cache.inner.is_empty());
    }
}
