//! Interface of the store client the strategy drives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use lockgate_core::{ClientError, LockHandle, LockOwner, Reachable};

use crate::RedisSettings;

/// One lock object obtained from the store client.
pub trait StoreLock: LockHandle {
    /// Block up to `wait` for the lock, holding it for at most `lease`
    /// (`Duration::ZERO`: until released).
    fn try_lock(&self, owner: LockOwner, wait: Duration, lease: Duration)
        -> Result<bool, ClientError>;

    /// Same contract as [`StoreLock::try_lock`], waited on inside the client.
    fn try_lock_async(
        &self,
        owner: LockOwner,
        wait: Duration,
        lease: Duration,
    ) -> BoxFuture<'static, Result<bool, ClientError>>;

    /// Whether anyone holds the store-side lock.
    fn is_locked(&self) -> bool;
}

/// A read/write group; both sides share one store-side lock.
pub trait StoreReadWriteLock: Send + Sync + std::fmt::Debug {
    fn read_lock(&self) -> Arc<dyn StoreLock>;
    fn write_lock(&self) -> Arc<dyn StoreLock>;
}

/// A connected store client.
///
/// Lookups are local and cheap: they build a handle object for a name without
/// a round trip. Calling one twice yields two objects for the same store lock.
pub trait StoreClient: Reachable + Send + Sync + std::fmt::Debug {
    fn get_lock(&self, name: &str) -> Arc<dyn StoreLock>;
    fn get_fair_lock(&self, name: &str) -> Arc<dyn StoreLock>;
    fn get_read_write_lock(&self, name: &str) -> Arc<dyn StoreReadWriteLock>;
    fn shutdown(&self);
}

/// Builds a client from settings at initialize time.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, settings: &RedisSettings) -> Result<Arc<dyn StoreClient>, ClientError>;
}
