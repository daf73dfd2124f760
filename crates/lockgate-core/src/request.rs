use std::fmt;
use std::time::Duration;

use crate::{LockIdentity, LockKind};

/// Lease applied when the caller does not pick one.
pub const DEFAULT_LEASE: Duration = Duration::from_millis(5_000);

/// Wait window applied when the caller does not pick one.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(60_000);

/// How the backend client performs the acquisition wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireMode {
    /// The client blocks a worker thread until acquired or timed out.
    #[default]
    Blocking,
    /// The client returns a future resolving to the acquisition result.
    Async,
}

impl fmt::Display for AcquireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireMode::Blocking => write!(f, "blocking"),
            AcquireMode::Async => write!(f, "async"),
        }
    }
}

/// A request to run something under a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub kind: LockKind,
    pub key: String,
    /// Maximum hold time before the backend expires the lock on its own.
    /// `Duration::ZERO` means hold until released. Ignored by backends that
    /// rely on session liveness.
    pub lease: Duration,
    /// Upper bound on the acquisition phase only.
    pub wait: Duration,
    pub mode: AcquireMode,
    pub fair: bool,
}

impl LockRequest {
    pub fn new(kind: LockKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            lease: DEFAULT_LEASE,
            wait: DEFAULT_WAIT,
            mode: AcquireMode::Blocking,
            fair: false,
        }
    }

    pub fn exclusive(key: impl Into<String>) -> Self {
        Self::new(LockKind::Exclusive, key)
    }

    pub fn read(key: impl Into<String>) -> Self {
        Self::new(LockKind::ReadShared, key)
    }

    pub fn write(key: impl Into<String>) -> Self {
        Self::new(LockKind::WriteExclusive, key)
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn asynchronous(mut self, enabled: bool) -> Self {
        self.mode = if enabled {
            AcquireMode::Async
        } else {
            AcquireMode::Blocking
        };
        self
    }

    pub fn fair(mut self, fair: bool) -> Self {
        self.fair = fair;
        self
    }

    pub fn is_async(&self) -> bool {
        self.mode == AcquireMode::Async
    }

    pub fn identity(&self) -> LockIdentity {
        LockIdentity::new(self.kind, self.key.clone(), self.fair)
    }
}

impl fmt::Display for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lock '{}' (fair={}, mode={}, wait={}ms, lease={}ms)",
            self.kind,
            self.key,
            self.fair,
            self.mode,
            self.wait.as_millis(),
            self.lease.as_millis()
        )
    }
}

/// Result of a guarded invocation that did not fail.
///
/// `NotAcquired` is distinct from a business `None`: it means the operation
/// never ran because the wait window elapsed.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    Acquired(T),
    NotAcquired,
}

impl<T> LockOutcome<T> {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            LockOutcome::Acquired(value) => Some(value),
            LockOutcome::NotAcquired => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LockOutcome<U> {
        match self {
            LockOutcome::Acquired(value) => LockOutcome::Acquired(f(value)),
            LockOutcome::NotAcquired => LockOutcome::NotAcquired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let request = LockRequest::exclusive("orders:42");
        assert_eq!(request.lease, DEFAULT_LEASE);
        assert_eq!(request.wait, DEFAULT_WAIT);
        assert_eq!(request.mode, AcquireMode::Blocking);
        assert!(!request.fair);
    }

    #[test]
    fn builder_sets_fields() {
        let request = LockRequest::read("inventory")
            .with_wait(Duration::from_millis(250))
            .with_lease(Duration::ZERO)
            .asynchronous(true);
        assert_eq!(request.kind, LockKind::ReadShared);
        assert!(request.is_async());
        assert_eq!(request.wait, Duration::from_millis(250));
        assert_eq!(request.identity(), LockIdentity::new(LockKind::ReadShared, "inventory", false));
    }

    #[test]
    fn business_none_is_not_not_acquired() {
        let ran: LockOutcome<Option<u32>> = LockOutcome::Acquired(None);
        assert!(ran.is_acquired());
        let skipped: LockOutcome<Option<u32>> = LockOutcome::NotAcquired;
        assert!(!skipped.is_acquired());
        assert_ne!(ran, skipped);
        assert_eq!(LockOutcome::Acquired(2).map(|v| v * 2).into_option(), Some(4));
    }
}
