use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use lockgate_core::local::{Access, LocalLock, LockCell};
use lockgate_core::{ClientError, LockHandle, LockOwner, Reachable};
use tracing::{debug, info};

use crate::{
    EnsembleClient, EnsembleConnector, EnsembleMutex, EnsembleReadWriteLock, ZookeeperSettings,
};

#[derive(Debug)]
struct EnsembleShared {
    nodes: DashMap<String, Arc<LockCell>>,
    reachable: AtomicBool,
    closed: AtomicBool,
    fail_releases: AtomicBool,
}

impl EnsembleShared {
    fn node(&self, path: &str) -> Arc<LockCell> {
        Arc::clone(self.nodes.entry(path.to_string()).or_default().value())
    }

    fn is_started(&self) -> bool {
        self.reachable.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn check_started(&self, path: &str) -> Result<(), ClientError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(ClientError::ConnectionLost(format!(
                "session not connected while locking '{}'",
                path
            )))
        }
    }
}

/// In-process ensemble with the lock recipes' semantics.
///
/// Clones share one ensemble and one session. Mutexes and read/write pairs on
/// the same path are separate recipes and do not interlock. The toggles
/// simulate a dropped connection, failing release calls and session expiry.
#[derive(Debug, Clone)]
pub struct MemoryEnsemble {
    shared: Arc<EnsembleShared>,
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(EnsembleShared {
                nodes: DashMap::new(),
                reachable: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                fail_releases: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate losing (or regaining) the connection to the ensemble.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every release call fail until switched off.
    pub fn fail_releases(&self, fail: bool) {
        self.shared.fail_releases.store(fail, Ordering::SeqCst);
    }

    /// End the session: every ephemeral lock node disappears.
    pub fn expire_session(&self) {
        for node in self.shared.nodes.iter() {
            node.value().clear();
        }
        info!("Session expired, dropped {} lock node(s)", self.shared.nodes.len());
    }

    /// Connector handing out this ensemble; connecting reopens a closed session.
    pub fn connector(&self) -> Arc<dyn EnsembleConnector> {
        Arc::new(MemoryConnector {
            ensemble: self.clone(),
        })
    }

    fn recipe(&self, name: String, cell: Arc<LockCell>, access: Access) -> Arc<dyn EnsembleMutex> {
        Arc::new(MemoryMutex {
            lock: LocalLock::new(name, cell, access, false),
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl Reachable for MemoryEnsemble {
    fn is_started(&self) -> bool {
        self.shared.is_started()
    }
}

impl EnsembleClient for MemoryEnsemble {
    fn mutex(&self, path: &str) -> Arc<dyn EnsembleMutex> {
        self.recipe(
            path.to_string(),
            self.shared.node(&format!("mutex:{}", path)),
            Access::Exclusive,
        )
    }

    fn read_write_lock(&self, path: &str) -> Arc<dyn EnsembleReadWriteLock> {
        Arc::new(MemoryReadWriteLock {
            path: path.to_string(),
            node: self.shared.node(&format!("rw:{}", path)),
            ensemble: self.clone(),
        })
    }

    fn close(&self) {
        // Closing the session takes its ephemeral nodes with it.
        self.expire_session();
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct MemoryMutex {
    lock: LocalLock,
    shared: Arc<EnsembleShared>,
}

impl LockHandle for MemoryMutex {
    fn name(&self) -> &str {
        self.lock.name()
    }

    fn is_held_by(&self, owner: LockOwner) -> bool {
        self.lock.is_held_by(owner)
    }

    fn release(&self, owner: LockOwner) -> Result<(), ClientError> {
        self.shared.check_started(self.lock.name())?;
        if self.shared.fail_releases.load(Ordering::SeqCst) {
            return Err(ClientError::Other(format!(
                "delete of lock node under '{}' failed",
                self.lock.name()
            )));
        }
        self.lock.release(owner)
    }
}

impl EnsembleMutex for MemoryMutex {
    fn acquire(&self, owner: LockOwner, wait: Duration) -> Result<bool, ClientError> {
        self.shared.check_started(self.lock.name())?;
        Ok(self.lock.try_acquire(owner, wait, None))
    }

    fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

#[derive(Debug)]
struct MemoryReadWriteLock {
    path: String,
    node: Arc<LockCell>,
    ensemble: MemoryEnsemble,
}

impl EnsembleReadWriteLock for MemoryReadWriteLock {
    fn read_lock(&self) -> Arc<dyn EnsembleMutex> {
        self.ensemble.recipe(
            format!("{}#read", self.path),
            Arc::clone(&self.node),
            Access::Read,
        )
    }

    fn write_lock(&self) -> Arc<dyn EnsembleMutex> {
        self.ensemble.recipe(
            format!("{}#write", self.path),
            Arc::clone(&self.node),
            Access::Write,
        )
    }
}

struct MemoryConnector {
    ensemble: MemoryEnsemble,
}

#[async_trait]
impl EnsembleConnector for MemoryConnector {
    async fn connect(
        &self,
        settings: &ZookeeperSettings,
    ) -> Result<Arc<dyn EnsembleClient>, ClientError> {
        debug!(
            "Opening in-process session (connect string {:?} unused, session timeout {}ms)",
            settings.connect_string, settings.session_timeout_ms
        );
        self.ensemble.shared.closed.store(false, Ordering::SeqCst);
        Ok(Arc::new(self.ensemble.clone()))
    }
}
