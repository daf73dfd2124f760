//! Interface of the ensemble client the strategy drives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lockgate_core::{ClientError, LockHandle, LockOwner, Reachable};

use crate::ZookeeperSettings;

/// A lock recipe on one node path.
///
/// Holds are reentrant per owner and last until released or until the
/// client's session ends.
pub trait EnsembleMutex: LockHandle {
    /// Block up to `wait` for the lock.
    fn acquire(&self, owner: LockOwner, wait: Duration) -> Result<bool, ClientError>;

    /// Whether any participant holds the lock.
    fn is_locked(&self) -> bool;
}

/// Read/write recipe; both sides coordinate through one path.
pub trait EnsembleReadWriteLock: Send + Sync + std::fmt::Debug {
    fn read_lock(&self) -> Arc<dyn EnsembleMutex>;
    fn write_lock(&self) -> Arc<dyn EnsembleMutex>;
}

/// A connected ensemble client with one session.
pub trait EnsembleClient: Reachable + Send + Sync + std::fmt::Debug {
    fn mutex(&self, path: &str) -> Arc<dyn EnsembleMutex>;
    fn read_write_lock(&self, path: &str) -> Arc<dyn EnsembleReadWriteLock>;
    fn close(&self);
}

/// Opens a session from settings at initialize time.
#[async_trait]
pub trait EnsembleConnector: Send + Sync {
    async fn connect(
        &self,
        settings: &ZookeeperSettings,
    ) -> Result<Arc<dyn EnsembleClient>, ClientError>;
}
