use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::{ClientError, LockHandle, LockOwner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handoff {
    Waiting,
    Abandoned,
    Completed(bool),
}

/// Releases a lock the worker acquired for a caller that stopped waiting.
struct AbandonOnDrop<H: ?Sized + LockHandle> {
    handoff: Arc<Mutex<Handoff>>,
    handle: Arc<H>,
    owner: LockOwner,
    armed: bool,
}

impl<H: ?Sized + LockHandle> Drop for AbandonOnDrop<H> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.handoff.lock().unwrap_or_else(PoisonError::into_inner);
        if *slot == Handoff::Completed(true) {
            debug!(
                "Caller gave up on '{}' after it was acquired, releasing",
                self.handle.name()
            );
            if let Err(err) = self.handle.release(self.owner) {
                warn!("Failed to release abandoned lock '{}': {err}", self.handle.name());
            }
        }
        *slot = Handoff::Abandoned;
    }
}

/// Run a blocking client acquisition on the blocking pool.
///
/// If the awaiting future is dropped mid-wait, a lock the worker still manages
/// to acquire is released instead of being stranded: whichever side reaches
/// the handoff slot second does the release.
pub async fn acquire_blocking<H, F>(
    handle: Arc<H>,
    owner: LockOwner,
    attempt: F,
) -> Result<bool, ClientError>
where
    H: LockHandle + ?Sized + 'static,
    F: FnOnce(&H) -> Result<bool, ClientError> + Send + 'static,
{
    let handoff = Arc::new(Mutex::new(Handoff::Waiting));
    let mut sentinel = AbandonOnDrop {
        handoff: Arc::clone(&handoff),
        handle: Arc::clone(&handle),
        owner,
        armed: true,
    };

    let worker = tokio::task::spawn_blocking(move || {
        if *handoff.lock().unwrap_or_else(PoisonError::into_inner) == Handoff::Abandoned {
            return Ok(false);
        }

        let result = attempt(&handle);

        let mut slot = handoff.lock().unwrap_or_else(PoisonError::into_inner);
        if *slot == Handoff::Abandoned {
            if matches!(result, Ok(true)) {
                if let Err(err) = handle.release(owner) {
                    warn!("Failed to release abandoned lock '{}': {err}", handle.name());
                }
            }
            return Ok(false);
        }
        *slot = Handoff::Completed(matches!(result, Ok(true)));
        result
    });

    let joined = worker.await;
    sentinel.armed = false;
    joined.map_err(|e| ClientError::Interrupted(format!("acquisition task failed: {e}")))?
}
