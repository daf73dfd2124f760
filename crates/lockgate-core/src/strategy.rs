use std::future::Future;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    InvokeError, LockError, LockGuard, LockOutcome, LockOwner, LockRequest, LockResult,
};

/// A backend strategy: one backing store behind the common lock contract.
///
/// Each strategy enumerates its own supported kind/fair/async combinations in
/// `validate`; there is no shared default to inherit from.
#[async_trait]
pub trait LockStrategy: Send + Sync {
    /// Backend name used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Connect to the backing store and install the client.
    async fn initialize(&self) -> LockResult<()>;

    /// Remove the installed client and shut it down.
    async fn destroy(&self) -> LockResult<()>;

    /// Whether a client is installed and reachable.
    fn is_ready(&self) -> bool;

    /// Capability and readiness checks. Must not touch the network.
    fn validate(&self, request: &LockRequest) -> LockResult<()>;

    /// Resolve the handle for `request` and attempt a timed acquisition for
    /// `owner`. `Ok(None)` means the wait window elapsed with nothing held.
    async fn acquire(&self, request: &LockRequest, owner: LockOwner)
        -> LockResult<Option<LockGuard>>;
}

/// Reject keys no backend can address.
pub fn check_key(backend: &'static str, request: &LockRequest) -> LockResult<()> {
    if request.key.trim().is_empty() {
        return Err(LockError::InvalidKey {
            backend,
            key: request.key.clone(),
            reason: "key must not be empty",
        });
    }
    Ok(())
}

/// Validate, acquire, run `operation`, release.
///
/// The operation runs at most once and only after a successful acquisition.
/// Release happens before any result or failure is returned; a guard dropped
/// by a panic or a cancelled future still releases. An operation failure wins
/// over a release failure, which is then only logged.
pub async fn invoke_with<S, F, Fut, T, E>(
    strategy: &S,
    request: &LockRequest,
    operation: F,
) -> Result<LockOutcome<T>, InvokeError<E>>
where
    S: LockStrategy + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    strategy.validate(request)?;

    let owner = LockOwner::current_or_new();
    let Some(guard) = strategy.acquire(request, owner).await? else {
        debug!(
            "{}: {} not acquired within {}ms",
            strategy.backend(),
            request.kind,
            request.wait.as_millis()
        );
        return Ok(LockOutcome::NotAcquired);
    };

    let result = owner.scope(async move { operation().await }).await;
    let released = guard.release();

    match result {
        Ok(value) => {
            released?;
            Ok(LockOutcome::Acquired(value))
        }
        Err(err) => {
            if let Err(release_err) = released {
                warn!(
                    "{}: release failed after operation failure: {release_err}",
                    strategy.backend()
                );
            }
            Err(InvokeError::Operation(err))
        }
    }
}
