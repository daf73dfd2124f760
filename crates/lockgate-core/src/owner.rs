use std::fmt;
use std::future::Future;

use uuid::Uuid;

tokio::task_local! {
    static CURRENT_OWNER: LockOwner;
}

/// Identity an acquisition is made for.
///
/// Lock primitives track holds per owner, so an owner that already holds a
/// handle can acquire it again (reentrancy) while every other owner waits.
/// A protected operation runs inside its owner's scope: a nested invocation
/// from the same task inherits the owner. Tasks spawned from inside the
/// operation do not, and get a fresh owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockOwner(Uuid);

impl LockOwner {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Owner of the protected operation currently running on this task.
    pub fn current() -> Option<Self> {
        CURRENT_OWNER.try_with(|owner| *owner).ok()
    }

    pub fn current_or_new() -> Self {
        Self::current().unwrap_or_default()
    }

    /// Run `future` with `self` as the current owner.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT_OWNER.scope(self, future).await
    }
}

impl Default for LockOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
