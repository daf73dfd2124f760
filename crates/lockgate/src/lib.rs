//! Run an operation under a distributed lock.
//!
//! [`LockCoordinator`] fronts one backend chosen at construction time and
//! exposes a single [`LockCoordinator::invoke`]: acquire within the wait
//! window, run the operation, release on every exit path.
//!
//! ```ignore
//! let coordinator = LockCoordinator::redis(RedisSettings::default(), connector);
//! coordinator.initialize().await?;
//!
//! let request = LockRequest::exclusive("orders:42").with_wait(Duration::from_secs(1));
//! match coordinator.invoke(&request, || async { ship_order(42).await }).await? {
//!     LockOutcome::Acquired(receipt) => println!("shipped: {receipt}"),
//!     LockOutcome::NotAcquired => println!("someone else is shipping it"),
//! }
//! ```

mod coordinator;

pub use coordinator::{Backend, LockCoordinator};

pub use lockgate_core::{
    AcquireMode, Capability, ClientError, InvokeError, LockError, LockKind, LockOutcome,
    LockOwner, LockRequest, LockResult, DEFAULT_LEASE, DEFAULT_WAIT,
};
pub use lockgate_redis::{self as redis, RedisLockStrategy, RedisSettings};
pub use lockgate_zookeeper::{self as zookeeper, ZookeeperLockStrategy, ZookeeperSettings};
