use std::sync::{Arc, PoisonError, RwLock};

use crate::{LockError, LockResult};

/// Reachability probe every store client exposes.
pub trait Reachable {
    /// Whether the client is connected and started.
    fn is_started(&self) -> bool;
}

/// Installed backend client.
///
/// Written at initialize/destroy, read by every invocation. Re-initializing
/// while operations are in flight is not supported.
#[derive(Debug)]
pub struct BackendState<C: ?Sized> {
    backend: &'static str,
    client: RwLock<Option<Arc<C>>>,
}

impl<C: ?Sized + Reachable> BackendState<C> {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            client: RwLock::new(None),
        }
    }

    /// Install a connected client, returning the one it replaces.
    pub fn install(&self, client: Arc<C>) -> Option<Arc<C>> {
        self.client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(client)
    }

    /// Remove the installed client.
    pub fn take(&self) -> Option<Arc<C>> {
        self.client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_initialized(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready_client().is_ok()
    }

    /// The client, provided it was installed and is currently reachable.
    pub fn ready_client(&self) -> LockResult<Arc<C>> {
        let client = self
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(LockError::NotInitialized {
                backend: self.backend,
            })?;
        if !client.is_started() {
            return Err(LockError::NotReady {
                backend: self.backend,
            });
        }
        Ok(client)
    }
}
