use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::{ClientError, LockError, LockKind, LockOwner, LockRequest, LockResult};

/// A specific lock instance obtained from a backend client.
///
/// Acquisition is backend specific (lease, futures, sessions) and lives on the
/// backend's own handle trait; this is the part the guard needs to let go.
pub trait LockHandle: Send + Sync + fmt::Debug {
    /// Backend-side name of the lock.
    fn name(&self) -> &str;

    /// Whether `owner` currently holds this lock.
    fn is_held_by(&self, owner: LockOwner) -> bool;

    /// Release one hold of `owner`.
    fn release(&self, owner: LockOwner) -> Result<(), ClientError>;
}

/// What to do when releasing a held lock fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Return the failure to the caller.
    Surface,
    /// Log and carry on; the backend expires the hold on its own.
    LogAndIgnore,
}

/// A successful acquisition.
///
/// Releasing consumes the guard. A guard dropped without an explicit release
/// (panic, early return, cancelled future) releases in `Drop` and logs any
/// failure, since there is nobody left to surface it to.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard {
    handle: Arc<dyn LockHandle>,
    owner: LockOwner,
    backend: &'static str,
    kind: LockKind,
    key: String,
    policy: ReleasePolicy,
    acquired_at: Instant,
    released: bool,
}

impl LockGuard {
    pub fn new(
        handle: Arc<dyn LockHandle>,
        owner: LockOwner,
        backend: &'static str,
        request: &LockRequest,
        policy: ReleasePolicy,
    ) -> Self {
        Self {
            handle,
            owner,
            backend,
            kind: request.kind,
            key: request.key.clone(),
            policy,
            acquired_at: Instant::now(),
            released: false,
        }
    }

    pub fn owner(&self) -> LockOwner {
        self.owner
    }

    pub fn handle(&self) -> &Arc<dyn LockHandle> {
        &self.handle
    }

    pub fn is_held(&self) -> bool {
        !self.released && self.handle.is_held_by(self.owner)
    }

    pub fn release(mut self) -> LockResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> LockResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // The hold may already be gone (lease expiry, lost session).
        if !self.handle.is_held_by(self.owner) {
            debug!(
                "{} {} lock '{}' no longer held by {}, nothing to release",
                self.backend, self.kind, self.key, self.owner
            );
            return Ok(());
        }

        match self.handle.release(self.owner) {
            Ok(()) => {
                debug!(
                    "Released {} {} lock '{}' after {:.3}s",
                    self.backend,
                    self.kind,
                    self.key,
                    self.acquired_at.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(source) => match self.policy {
                ReleasePolicy::Surface => Err(LockError::Release {
                    backend: self.backend,
                    kind: self.kind,
                    key: self.key.clone(),
                    source,
                }),
                ReleasePolicy::LogAndIgnore => {
                    warn!(
                        "Failed to release {} {} lock '{}', leaving it to lease expiry: {}",
                        self.backend, self.kind, self.key, source
                    );
                    Ok(())
                }
            },
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("backend", &self.backend)
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.release_inner() {
            warn!("Failed to release lock during drop: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{Access, LocalLock, LockCell};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Flaky {
        lock: LocalLock,
        fail: AtomicBool,
    }

    impl LockHandle for Flaky {
        fn name(&self) -> &str {
            self.lock.name()
        }

        fn is_held_by(&self, owner: LockOwner) -> bool {
            self.lock.is_held_by(owner)
        }

        fn release(&self, owner: LockOwner) -> Result<(), ClientError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::ConnectionLost("test".to_string()));
            }
            self.lock.release(owner)
        }
    }

    fn held(fail: bool) -> (Arc<Flaky>, LockOwner) {
        let lock = LocalLock::new("k", Arc::new(LockCell::new()), Access::Exclusive, false);
        let owner = LockOwner::new();
        assert!(lock.try_acquire(owner, Duration::ZERO, None));
        let handle = Arc::new(Flaky {
            lock,
            fail: AtomicBool::new(fail),
        });
        (handle, owner)
    }

    #[test]
    fn release_frees_the_lock() {
        let (handle, owner) = held(false);
        let guard = LockGuard::new(
            handle.clone(),
            owner,
            "test",
            &LockRequest::exclusive("k"),
            ReleasePolicy::Surface,
        );
        assert!(guard.is_held());
        guard.release().unwrap();
        assert!(!handle.is_held_by(owner));
    }

    #[test]
    fn drop_releases() {
        let (handle, owner) = held(false);
        {
            let _guard = LockGuard::new(
                handle.clone(),
                owner,
                "test",
                &LockRequest::exclusive("k"),
                ReleasePolicy::Surface,
            );
        }
        assert!(!handle.is_held_by(owner));
    }

    #[test]
    fn surface_policy_returns_release_failure() {
        let (handle, owner) = held(true);
        let guard = LockGuard::new(
            handle,
            owner,
            "test",
            &LockRequest::exclusive("k"),
            ReleasePolicy::Surface,
        );
        let err = guard.release().unwrap_err();
        assert!(matches!(err, LockError::Release { .. }));
    }

    #[test]
    fn log_policy_swallows_release_failure() {
        let (handle, owner) = held(true);
        let guard = LockGuard::new(
            handle,
            owner,
            "test",
            &LockRequest::exclusive("k"),
            ReleasePolicy::LogAndIgnore,
        );
        guard.release().unwrap();
    }

    #[test]
    fn unheld_handle_is_a_noop() {
        let (handle, owner) = held(true);
        handle.fail.store(false, Ordering::SeqCst);
        handle.release(owner).unwrap();
        handle.fail.store(true, Ordering::SeqCst);

        // Not held any more, so the failing release is never attempted.
        let guard = LockGuard::new(
            handle,
            owner,
            "test",
            &LockRequest::exclusive("k"),
            ReleasePolicy::Surface,
        );
        guard.release().unwrap();
    }
}
