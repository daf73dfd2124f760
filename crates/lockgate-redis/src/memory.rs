use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use lockgate_core::local::{Access, LocalLock, LockCell};
use lockgate_core::{acquire_blocking, ClientError, LockHandle, LockOwner, Reachable};
use tracing::debug;

use crate::{RedisSettings, StoreClient, StoreConnector, StoreLock, StoreReadWriteLock};

#[derive(Debug)]
struct StoreShared {
    cells: DashMap<String, Arc<LockCell>>,
    reachable: AtomicBool,
    shut_down: AtomicBool,
    fail_unlocks: AtomicBool,
}

impl StoreShared {
    fn cell(&self, name: &str) -> Arc<LockCell> {
        Arc::clone(self.cells.entry(name.to_string()).or_default().value())
    }

    fn is_started(&self) -> bool {
        self.reachable.load(Ordering::SeqCst) && !self.shut_down.load(Ordering::SeqCst)
    }

    fn check_started(&self, name: &str) -> Result<(), ClientError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(ClientError::ConnectionLost(format!(
                "store unreachable while locking '{}'",
                name
            )))
        }
    }
}

/// In-process store with the store's lock semantics.
///
/// Clones share one store. Lock state lives per name: plain and fair locks of
/// a name are the same store-side lock, read/write groups live apart from them.
/// The toggles simulate an unreachable store and failing unlock calls.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<StoreShared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(StoreShared {
                cells: DashMap::new(),
                reachable: AtomicBool::new(true),
                shut_down: AtomicBool::new(false),
                fail_unlocks: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate losing (or regaining) the connection.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every unlock call fail until switched off.
    pub fn fail_unlocks(&self, fail: bool) {
        self.shared.fail_unlocks.store(fail, Ordering::SeqCst);
    }

    /// Connector handing out this store; connecting restarts it after a shutdown.
    pub fn connector(&self) -> Arc<dyn StoreConnector> {
        Arc::new(MemoryConnector {
            store: self.clone(),
        })
    }

    fn handle(&self, name: &str, fair: bool) -> Arc<dyn StoreLock> {
        Arc::new(MemoryStoreLock {
            lock: LocalLock::new(
                name,
                self.shared.cell(&format!("lock:{}", name)),
                Access::Exclusive,
                fair,
            ),
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Reachable for MemoryStore {
    fn is_started(&self) -> bool {
        self.shared.is_started()
    }
}

impl StoreClient for MemoryStore {
    fn get_lock(&self, name: &str) -> Arc<dyn StoreLock> {
        self.handle(name, false)
    }

    fn get_fair_lock(&self, name: &str) -> Arc<dyn StoreLock> {
        self.handle(name, true)
    }

    fn get_read_write_lock(&self, name: &str) -> Arc<dyn StoreReadWriteLock> {
        Arc::new(MemoryReadWriteLock {
            name: name.to_string(),
            cell: self.shared.cell(&format!("rwlock:{}", name)),
            shared: Arc::clone(&self.shared),
        })
    }

    fn shutdown(&self) {
        self.shared.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Lock object handed out by [`MemoryStore`].
#[derive(Debug)]
struct MemoryStoreLock {
    lock: LocalLock,
    shared: Arc<StoreShared>,
}

fn lease_of(lease: Duration) -> Option<Duration> {
    (!lease.is_zero()).then_some(lease)
}

impl LockHandle for MemoryStoreLock {
    fn name(&self) -> &str {
        self.lock.name()
    }

    fn is_held_by(&self, owner: LockOwner) -> bool {
        self.lock.is_held_by(owner)
    }

    fn release(&self, owner: LockOwner) -> Result<(), ClientError> {
        self.shared.check_started(self.lock.name())?;
        if self.shared.fail_unlocks.load(Ordering::SeqCst) {
            return Err(ClientError::Other(format!(
                "unlock of '{}' rejected",
                self.lock.name()
            )));
        }
        self.lock.release(owner)
    }
}

impl StoreLock for MemoryStoreLock {
    fn try_lock(
        &self,
        owner: LockOwner,
        wait: Duration,
        lease: Duration,
    ) -> Result<bool, ClientError> {
        self.shared.check_started(self.lock.name())?;
        Ok(self.lock.try_acquire(owner, wait, lease_of(lease)))
    }

    fn try_lock_async(
        &self,
        owner: LockOwner,
        wait: Duration,
        lease: Duration,
    ) -> BoxFuture<'static, Result<bool, ClientError>> {
        let handle = Arc::new(MemoryStoreLock {
            lock: self.lock.clone(),
            shared: Arc::clone(&self.shared),
        });
        Box::pin(async move {
            handle.shared.check_started(handle.lock.name())?;
            acquire_blocking(handle, owner, move |h| {
                Ok(h.lock.try_acquire(owner, wait, lease_of(lease)))
            })
            .await
        })
    }

    fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

#[derive(Debug)]
struct MemoryReadWriteLock {
    name: String,
    cell: Arc<LockCell>,
    shared: Arc<StoreShared>,
}

impl MemoryReadWriteLock {
    fn side(&self, suffix: &str, access: Access) -> Arc<dyn StoreLock> {
        Arc::new(MemoryStoreLock {
            lock: LocalLock::new(
                format!("{}:{}", self.name, suffix),
                Arc::clone(&self.cell),
                access,
                false,
            ),
            shared: Arc::clone(&self.shared),
        })
    }
}

impl StoreReadWriteLock for MemoryReadWriteLock {
    fn read_lock(&self) -> Arc<dyn StoreLock> {
        self.side("read", Access::Read)
    }

    fn write_lock(&self) -> Arc<dyn StoreLock> {
        self.side("write", Access::Write)
    }
}

struct MemoryConnector {
    store: MemoryStore,
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, settings: &RedisSettings) -> Result<Arc<dyn StoreClient>, ClientError> {
        debug!(
            "Connecting in-process store (configured addresses {:?} unused)",
            settings.addresses
        );
        self.store.shared.shut_down.store(false, Ordering::SeqCst);
        Ok(Arc::new(self.store.clone()))
    }
}
