use std::future::Future;
use std::sync::Arc;

use lockgate_core::{
    invoke_with, Capability, InvokeError, LockError, LockKind, LockOutcome, LockRequest,
    LockResult, LockStrategy,
};
use lockgate_redis::{RedisLockStrategy, RedisSettings, StoreConnector};
use lockgate_zookeeper::{EnsembleConnector, ZookeeperLockStrategy, ZookeeperSettings};
use tracing::instrument;

/// The configured backend. One per deployment; not switched at runtime.
pub enum Backend {
    Redis(RedisLockStrategy),
    Zookeeper(ZookeeperLockStrategy),
}

impl Backend {
    fn strategy(&self) -> &dyn LockStrategy {
        match self {
            Backend::Redis(strategy) => strategy,
            Backend::Zookeeper(strategy) => strategy,
        }
    }
}

/// Facade running operations under locks from the configured backend.
pub struct LockCoordinator {
    backend: Backend,
}

impl LockCoordinator {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn redis(settings: RedisSettings, connector: Arc<dyn StoreConnector>) -> Self {
        Self::new(Backend::Redis(RedisLockStrategy::new(settings, connector)))
    }

    pub fn zookeeper(settings: ZookeeperSettings, connector: Arc<dyn EnsembleConnector>) -> Self {
        Self::new(Backend::Zookeeper(ZookeeperLockStrategy::new(
            settings, connector,
        )))
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.strategy().backend()
    }

    pub async fn initialize(&self) -> LockResult<()> {
        self.backend.strategy().initialize().await
    }

    pub async fn destroy(&self) -> LockResult<()> {
        self.backend.strategy().destroy().await
    }

    pub fn is_ready(&self) -> bool {
        self.backend.strategy().is_ready()
    }

    /// Run `operation` while holding the lock described by `request`.
    ///
    /// Returns `LockOutcome::NotAcquired` when the wait window elapses; the
    /// operation is then never called. Once acquired, the lock is released
    /// before the operation's value or error is handed back.
    #[instrument(
        skip(self, request, operation),
        fields(backend = self.backend_name(), kind = %request.kind, key = %request.key),
        level = "debug"
    )]
    pub async fn invoke<F, Fut, T, E>(
        &self,
        request: &LockRequest,
        operation: F,
    ) -> Result<LockOutcome<T>, InvokeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if request.kind != LockKind::Exclusive && request.fair {
            return Err(InvokeError::Lock(LockError::Unsupported {
                backend: self.backend_name(),
                capability: Capability::Fair,
                kind: request.kind,
                key: request.key.clone(),
            }));
        }

        match &self.backend {
            Backend::Redis(strategy) => invoke_with(strategy, request, operation).await,
            Backend::Zookeeper(strategy) => invoke_with(strategy, request, operation).await,
        }
    }
}
