use std::sync::Arc;

use async_trait::async_trait;
use lockgate_core::{
    acquire_blocking, check_key, BackendState, Capability, HandleCache, LockError, LockGuard,
    LockKind, LockOwner, LockRequest, LockResult, LockStrategy, ReleasePolicy,
};
use tracing::{debug, info, instrument};

use crate::{
    lock_path, EnsembleClient, EnsembleConnector, EnsembleMutex, EnsembleReadWriteLock,
    NodeIdentity, ZookeeperSettings,
};

/// Backend name used in logs and errors.
pub const BACKEND: &str = "zookeeper";

/// Lock strategy over a ZooKeeper-style ensemble.
///
/// Offers `Exclusive`, `ReadShared` and `WriteExclusive`, blocking and unfair
/// only. Holds have no lease: they last until released or until the session
/// ends, so the request's lease is ignored and a failed release is surfaced.
pub struct ZookeeperLockStrategy {
    settings: ZookeeperSettings,
    connector: Arc<dyn EnsembleConnector>,
    state: BackendState<dyn EnsembleClient>,
    locks: HandleCache<NodeIdentity, Arc<dyn EnsembleMutex>>,
    groups: HandleCache<String, Arc<dyn EnsembleReadWriteLock>>,
}

impl ZookeeperLockStrategy {
    pub fn new(settings: ZookeeperSettings, connector: Arc<dyn EnsembleConnector>) -> Self {
        let threshold = settings.cache.warn_threshold;
        Self {
            settings,
            connector,
            state: BackendState::new(BACKEND),
            locks: HandleCache::new("zookeeper mutex", threshold),
            groups: HandleCache::new("zookeeper read/write group", threshold),
        }
    }

    pub fn settings(&self) -> &ZookeeperSettings {
        &self.settings
    }

    pub fn cached_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn cached_groups(&self) -> usize {
        self.groups.len()
    }

    fn path_of(&self, request: &LockRequest) -> LockResult<String> {
        lock_path(&self.settings.root_path, &request.key).map_err(|reason| LockError::InvalidKey {
            backend: BACKEND,
            key: request.key.clone(),
            reason,
        })
    }

    /// Resolve the handle for `request` through the caches.
    pub fn resolve(&self, request: &LockRequest) -> LockResult<Arc<dyn EnsembleMutex>> {
        let client = self.state.ready_client()?;
        let identity = NodeIdentity::new(self.path_of(request)?, request.kind);
        if !self.settings.cache.enabled {
            return Ok(self.new_lock(client.as_ref(), &identity));
        }
        Ok(self
            .locks
            .get_or_create(identity.clone(), || self.new_lock(client.as_ref(), &identity)))
    }

    fn new_lock(&self, client: &dyn EnsembleClient, identity: &NodeIdentity) -> Arc<dyn EnsembleMutex> {
        match identity.kind {
            LockKind::Exclusive => client.mutex(&identity.path),
            LockKind::ReadShared => self.group(client, &identity.path).read_lock(),
            LockKind::WriteExclusive => self.group(client, &identity.path).write_lock(),
        }
    }

    /// Forget handles built by a session that is being replaced or closed.
    fn clear_caches(&self) {
        self.locks.clear();
        self.groups.clear();
    }

    fn group(&self, client: &dyn EnsembleClient, path: &str) -> Arc<dyn EnsembleReadWriteLock> {
        self.groups
            .get_or_create(path.to_string(), || client.read_write_lock(path))
    }

    fn unsupported(request: &LockRequest, capability: Capability) -> LockError {
        LockError::Unsupported {
            backend: BACKEND,
            capability,
            kind: request.kind,
            key: request.key.clone(),
        }
    }
}

#[async_trait]
impl LockStrategy for ZookeeperLockStrategy {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), level = "debug")]
    async fn initialize(&self) -> LockResult<()> {
        self.settings.validate()?;
        let client = self
            .connector
            .connect(&self.settings)
            .await
            .map_err(|source| LockError::Connect {
                backend: BACKEND,
                source,
            })?;
        if let Some(previous) = self.state.install(client) {
            previous.close();
        }
        self.clear_caches();
        info!(
            "Initialized {} backend ({}, root {}, digest auth {})",
            BACKEND,
            self.settings.connect_string,
            self.settings.root_path,
            if self.settings.digest.is_some() { "on" } else { "off" }
        );
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn destroy(&self) -> LockResult<()> {
        if let Some(client) = self.state.take() {
            self.clear_caches();
            client.close();
            info!("Destroyed {} backend", BACKEND);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    fn validate(&self, request: &LockRequest) -> LockResult<()> {
        check_key(BACKEND, request)?;
        if request.fair {
            return Err(Self::unsupported(request, Capability::Fair));
        }
        if request.is_async() {
            return Err(Self::unsupported(request, Capability::Async));
        }
        self.path_of(request)?;
        self.state.ready_client().map(|_| ())
    }

    #[instrument(
        skip(self, request),
        fields(kind = %request.kind, key = %request.key),
        level = "debug"
    )]
    async fn acquire(
        &self,
        request: &LockRequest,
        owner: LockOwner,
    ) -> LockResult<Option<LockGuard>> {
        let lock = self.resolve(request)?;
        let wait = request.wait;

        let acquired = acquire_blocking(Arc::clone(&lock), owner, move |lock| {
            lock.acquire(owner, wait)
        })
        .await
        .map_err(|source| LockError::Acquire {
            backend: BACKEND,
            kind: request.kind,
            key: request.key.clone(),
            source,
        })?;

        if !acquired {
            debug!("Lock '{}' busy for {}ms", lock.name(), wait.as_millis());
            return Ok(None);
        }
        debug!("Acquired '{}' for {}", lock.name(), owner);
        Ok(Some(LockGuard::new(
            lock,
            owner,
            BACKEND,
            request,
            ReleasePolicy::Surface,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryEnsemble;
    use lockgate_core::{invoke_with, ClientError, InvokeError, LockOutcome, Reachable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    async fn setup() -> (Arc<ZookeeperLockStrategy>, MemoryEnsemble) {
        setup_with(ZookeeperSettings::default()).await
    }

    async fn setup_with(settings: ZookeeperSettings) -> (Arc<ZookeeperLockStrategy>, MemoryEnsemble) {
        let ensemble = MemoryEnsemble::new();
        let strategy = Arc::new(ZookeeperLockStrategy::new(settings, ensemble.connector()));
        strategy.initialize().await.unwrap();
        (strategy, ensemble)
    }

    fn quick(request: LockRequest) -> LockRequest {
        request.with_wait(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn async_rejected_before_any_client_interaction() {
        // Never initialized: capability checks still come first.
        let strategy =
            ZookeeperLockStrategy::new(ZookeeperSettings::default(), MemoryEnsemble::new().connector());
        for kind in LockKind::ALL {
            let err = strategy
                .validate(&LockRequest::new(kind, "k").asynchronous(true))
                .unwrap_err();
            assert!(matches!(
                err,
                LockError::Unsupported {
                    capability: Capability::Async,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn fair_rejected_for_every_kind() {
        let (strategy, _ensemble) = setup().await;
        for kind in LockKind::ALL {
            let runs = AtomicUsize::new(0);
            let err = invoke_with(strategy.as_ref(), &LockRequest::new(kind, "k").fair(true), || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await
            .unwrap_err();
            assert!(matches!(
                err.as_lock(),
                Some(LockError::Unsupported {
                    capability: Capability::Fair,
                    ..
                })
            ));
            assert_eq!(runs.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn readiness_checked_after_capabilities() {
        let strategy =
            ZookeeperLockStrategy::new(ZookeeperSettings::default(), MemoryEnsemble::new().connector());
        assert!(matches!(
            strategy.validate(&LockRequest::exclusive("k")),
            Err(LockError::NotInitialized { backend: "zookeeper" })
        ));

        let (strategy, ensemble) = setup().await;
        ensemble.set_reachable(false);
        assert!(!strategy.is_ready());
        assert!(matches!(
            strategy.validate(&LockRequest::exclusive("k")),
            Err(LockError::NotReady { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_settings_fail_initialize() {
        let settings = ZookeeperSettings {
            root_path: "relative".to_string(),
            ..Default::default()
        };
        let strategy = ZookeeperLockStrategy::new(settings, MemoryEnsemble::new().connector());
        assert!(matches!(strategy.initialize().await, Err(LockError::Config { .. })));
        assert!(!strategy.is_ready());
    }

    #[tokio::test]
    async fn unaddressable_key_is_invalid() {
        let (strategy, _ensemble) = setup().await;
        assert!(matches!(
            strategy.validate(&LockRequest::exclusive("a//b")),
            Err(LockError::InvalidKey { .. })
        ));
    }

    #[tokio::test]
    async fn cache_is_keyed_by_path_and_kind() {
        let (strategy, _ensemble) = setup().await;
        let a = strategy.resolve(&LockRequest::exclusive("orders:42")).unwrap();
        let b = strategy.resolve(&LockRequest::exclusive("orders:42")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "/lockgate/orders:42");

        strategy.resolve(&LockRequest::read("inventory")).unwrap();
        strategy.resolve(&LockRequest::write("inventory")).unwrap();
        assert_eq!(strategy.cached_locks(), 3);
        assert_eq!(strategy.cached_groups(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolution_yields_one_handle() {
        let (strategy, _ensemble) = setup().await;
        const TASKS: usize = 8;
        let barrier = Arc::new(Barrier::new(TASKS));

        let mut tasks = Vec::new();
        for _ in 0..TASKS {
            let strategy = Arc::clone(&strategy);
            let barrier = Arc::clone(&barrier);
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                strategy.resolve(&LockRequest::write("inventory")).unwrap()
            }));
        }

        let first = tasks.remove(0).await.unwrap();
        for task in tasks {
            assert!(Arc::ptr_eq(&first, &task.await.unwrap()));
        }
    }

    #[tokio::test]
    async fn disabled_cache_creates_fresh_mutexes() {
        let mut settings = ZookeeperSettings::default();
        settings.cache.enabled = false;
        let (strategy, _ensemble) = setup_with(settings).await;

        let a = strategy.resolve(&LockRequest::exclusive("k")).unwrap();
        let b = strategy.resolve(&LockRequest::exclusive("k")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        strategy.resolve(&LockRequest::read("k")).unwrap();
        assert_eq!(strategy.cached_locks(), 0);
        assert_eq!(strategy.cached_groups(), 1);
    }

    #[tokio::test]
    async fn held_during_operation_released_after() {
        let (strategy, _ensemble) = setup().await;
        let request = quick(LockRequest::exclusive("orders:42"));
        let lock = strategy.resolve(&request).unwrap();

        let outcome = invoke_with(strategy.as_ref(), &request, || async {
            let owner = LockOwner::current().unwrap();
            Ok::<_, String>(lock.is_held_by(owner))
        })
        .await
        .unwrap();

        assert_eq!(outcome, LockOutcome::Acquired(true));
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn timeout_skips_operation() {
        let (strategy, _ensemble) = setup().await;
        let lock = strategy.resolve(&LockRequest::write("inventory")).unwrap();
        assert!(lock.acquire(LockOwner::new(), Duration::ZERO).unwrap());

        let runs = AtomicUsize::new(0);
        let outcome = invoke_with(strategy.as_ref(), &quick(LockRequest::read("inventory")), || async {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, LockOutcome::NotAcquired);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn release_failure_is_surfaced() {
        let (strategy, ensemble) = setup().await;
        let request = quick(LockRequest::exclusive("k"));
        let err = invoke_with(strategy.as_ref(), &request, || async {
            ensemble.fail_releases(true);
            Ok::<_, String>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, InvokeError::Lock(LockError::Release { backend: "zookeeper", .. })));
    }

    #[tokio::test]
    async fn operation_failure_wins_over_release_failure() {
        let (strategy, ensemble) = setup().await;
        let err = invoke_with(strategy.as_ref(), &quick(LockRequest::exclusive("k")), || async {
            ensemble.fail_releases(true);
            Err::<(), _>("boom")
        })
        .await
        .unwrap_err();
        assert_eq!(err.into_operation(), Some("boom"));
    }

    #[tokio::test]
    async fn expired_session_makes_release_a_no_op() {
        let (strategy, ensemble) = setup().await;
        let outcome = invoke_with(strategy.as_ref(), &quick(LockRequest::exclusive("k")), || async {
            ensemble.expire_session();
            Ok::<_, String>("done")
        })
        .await
        .unwrap();
        assert_eq!(outcome, LockOutcome::Acquired("done"));
    }

    #[tokio::test]
    async fn nested_invoke_reenters_the_mutex() {
        let (strategy, _ensemble) = setup().await;
        let request = quick(LockRequest::exclusive("orders:42"));

        let outcome = invoke_with(strategy.as_ref(), &request, || async {
            invoke_with(strategy.as_ref(), &request, || async { Ok::<_, String>(7) })
                .await
                .map_err(|e| e.to_string())
        })
        .await
        .unwrap();

        assert_eq!(outcome, LockOutcome::Acquired(LockOutcome::Acquired(7)));
        assert!(!strategy.resolve(&request).unwrap().is_locked());
    }

    /// Opens a session on a brand new ensemble every time.
    struct FreshEnsembles;

    #[async_trait]
    impl EnsembleConnector for FreshEnsembles {
        async fn connect(
            &self,
            _settings: &ZookeeperSettings,
        ) -> Result<Arc<dyn EnsembleClient>, ClientError> {
            Ok(Arc::new(MemoryEnsemble::new()))
        }
    }

    #[tokio::test]
    async fn restart_drops_handles_of_the_old_session() {
        let strategy =
            ZookeeperLockStrategy::new(ZookeeperSettings::default(), Arc::new(FreshEnsembles));
        let requests = [
            quick(LockRequest::exclusive("orders:42")),
            quick(LockRequest::write("inventory")),
        ];

        strategy.initialize().await.unwrap();
        for request in &requests {
            let outcome = invoke_with(&strategy, request, || async { Ok::<_, String>(1) })
                .await
                .unwrap();
            assert_eq!(outcome, LockOutcome::Acquired(1));
        }

        strategy.destroy().await.unwrap();
        assert_eq!(strategy.cached_locks(), 0);
        assert_eq!(strategy.cached_groups(), 0);

        strategy.initialize().await.unwrap();
        assert!(strategy.is_ready());
        for request in &requests {
            let outcome = invoke_with(&strategy, request, || async { Ok::<_, String>(2) })
                .await
                .unwrap();
            assert_eq!(outcome, LockOutcome::Acquired(2));
        }
    }

    #[tokio::test]
    async fn destroy_closes_session() {
        let (strategy, ensemble) = setup().await;
        strategy.destroy().await.unwrap();
        assert!(!ensemble.is_started());
        assert!(matches!(
            strategy.validate(&LockRequest::exclusive("k")),
            Err(LockError::NotInitialized { .. })
        ));
    }
}
