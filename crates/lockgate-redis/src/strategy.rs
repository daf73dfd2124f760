use std::sync::Arc;

use async_trait::async_trait;
use lockgate_core::{
    acquire_blocking, check_key, AcquireMode, BackendState, Capability, GroupIdentity,
    HandleCache, LockError, LockGuard, LockIdentity, LockKind, LockOwner, LockRequest,
    LockResult, LockStrategy, ReleasePolicy,
};
use tracing::{debug, info, instrument};

use crate::{RedisSettings, StoreClient, StoreConnector, StoreLock, StoreReadWriteLock};

/// Backend name used in logs and errors.
pub const BACKEND: &str = "redis";

/// Lock strategy over a Redis-style store.
///
/// Supported combinations:
///
/// | kind             | fair | blocking | async |
/// |------------------|------|----------|-------|
/// | `Exclusive`      | yes  | yes      | yes   |
/// | `ReadShared`     | no   | yes      | yes   |
/// | `WriteExclusive` | no   | yes      | yes   |
///
/// Every acquisition carries the request's lease, so a failed unlock is logged
/// and left to expire rather than surfaced. The lease is not renewed: an
/// operation outliving it keeps running after the store has let the lock go.
pub struct RedisLockStrategy {
    settings: RedisSettings,
    connector: Arc<dyn StoreConnector>,
    state: BackendState<dyn StoreClient>,
    locks: HandleCache<LockIdentity, Arc<dyn StoreLock>>,
    groups: HandleCache<GroupIdentity, Arc<dyn StoreReadWriteLock>>,
}

impl RedisLockStrategy {
    pub fn new(settings: RedisSettings, connector: Arc<dyn StoreConnector>) -> Self {
        let threshold = settings.cache.warn_threshold;
        Self {
            settings,
            connector,
            state: BackendState::new(BACKEND),
            locks: HandleCache::new("redis lock", threshold),
            groups: HandleCache::new("redis read/write group", threshold),
        }
    }

    pub fn settings(&self) -> &RedisSettings {
        &self.settings
    }

    /// Number of cached lock handles.
    pub fn cached_locks(&self) -> usize {
        self.locks.len()
    }

    /// Number of cached read/write groups.
    pub fn cached_groups(&self) -> usize {
        self.groups.len()
    }

    /// Resolve the handle for `request` through the caches.
    pub fn resolve(&self, request: &LockRequest) -> LockResult<Arc<dyn StoreLock>> {
        let client = self.state.ready_client()?;
        let identity = request.identity();
        if !self.settings.cache.enabled {
            return Ok(self.new_lock(client.as_ref(), &identity));
        }
        Ok(self
            .locks
            .get_or_create(identity.clone(), || self.new_lock(client.as_ref(), &identity)))
    }

    fn new_lock(&self, client: &dyn StoreClient, identity: &LockIdentity) -> Arc<dyn StoreLock> {
        match identity.kind {
            LockKind::Exclusive if identity.fair => client.get_fair_lock(&identity.key),
            LockKind::Exclusive => client.get_lock(&identity.key),
            LockKind::ReadShared => self.group(client, identity).read_lock(),
            LockKind::WriteExclusive => self.group(client, identity).write_lock(),
        }
    }

    /// Forget handles built by a client that is being replaced or removed.
    fn clear_caches(&self) {
        self.locks.clear();
        self.groups.clear();
    }

    fn group(&self, client: &dyn StoreClient, identity: &LockIdentity) -> Arc<dyn StoreReadWriteLock> {
        self.groups.get_or_create(identity.group(), || {
            client.get_read_write_lock(&identity.key)
        })
    }
}

#[async_trait]
impl LockStrategy for RedisLockStrategy {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), level = "debug")]
    async fn initialize(&self) -> LockResult<()> {
        let client = self
            .connector
            .connect(&self.settings)
            .await
            .map_err(|source| LockError::Connect {
                backend: BACKEND,
                source,
            })?;
        if let Some(previous) = self.state.install(client) {
            previous.shutdown();
        }
        self.clear_caches();
        info!(
            "Initialized {} backend ({} address(es), handle cache {})",
            BACKEND,
            self.settings.addresses.len(),
            if self.settings.cache.enabled { "on" } else { "off" }
        );
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn destroy(&self) -> LockResult<()> {
        if let Some(client) = self.state.take() {
            self.clear_caches();
            client.shutdown();
            info!("Destroyed {} backend", BACKEND);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    fn validate(&self, request: &LockRequest) -> LockResult<()> {
        check_key(BACKEND, request)?;
        match (request.kind, request.fair) {
            (LockKind::Exclusive, _) => {}
            (LockKind::ReadShared | LockKind::WriteExclusive, false) => {}
            (LockKind::ReadShared | LockKind::WriteExclusive, true) => {
                return Err(LockError::Unsupported {
                    backend: BACKEND,
                    capability: Capability::Fair,
                    kind: request.kind,
                    key: request.key.clone(),
                });
            }
        }
        // Blocking and async acquisition are both offered for every kind.
        self.state.ready_client().map(|_| ())
    }

    #[instrument(
        skip(self, request),
        fields(kind = %request.kind, key = %request.key, mode = %request.mode),
        level = "debug"
    )]
    async fn acquire(
        &self,
        request: &LockRequest,
        owner: LockOwner,
    ) -> LockResult<Option<LockGuard>> {
        let lock = self.resolve(request)?;
        let (wait, lease) = (request.wait, request.lease);

        let attempt = match request.mode {
            AcquireMode::Blocking => {
                acquire_blocking(Arc::clone(&lock), owner, move |lock| {
                    lock.try_lock(owner, wait, lease)
                })
                .await
            }
            AcquireMode::Async => lock.try_lock_async(owner, wait, lease).await,
        };
        let acquired = attempt.map_err(|source| LockError::Acquire {
            backend: BACKEND,
            kind: request.kind,
            key: request.key.clone(),
            source,
        })?;

        if !acquired {
            debug!("Lock '{}' busy for {}ms", lock.name(), wait.as_millis());
            return Ok(None);
        }
        debug!("Acquired '{}' for {} (lease {}ms)", lock.name(), owner, lease.as_millis());
        Ok(Some(LockGuard::new(
            lock,
            owner,
            BACKEND,
            request,
            ReleasePolicy::LogAndIgnore,
        )))
    }
}
