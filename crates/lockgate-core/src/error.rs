use std::fmt;

use thiserror::Error;

use crate::LockKind;

/// Result type for lock coordination.
pub type LockResult<T> = Result<T, LockError>;

/// Errors reported by a backing store client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Not the lock owner: {0}")]
    NotOwner(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("Client error: {0}")]
    Other(String),
}

/// A lock semantic a backend may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Fair,
    Async,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Fair => write!(f, "fair locking"),
            Capability::Async => write!(f, "asynchronous acquisition"),
        }
    }
}

/// Errors that can occur while coordinating a lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// The backend client was never connected.
    #[error("{backend} client isn't initialized")]
    NotInitialized { backend: &'static str },

    /// The backend client is connected but currently unreachable.
    #[error("{backend} client isn't started")]
    NotReady { backend: &'static str },

    /// The requested kind/fair/async combination is not offered by the backend.
    #[error("{backend} doesn't support {capability} for {kind} lock '{key}'")]
    Unsupported {
        backend: &'static str,
        capability: Capability,
        kind: LockKind,
        key: String,
    },

    #[error("{backend} rejected lock key {key:?}: {reason}")]
    InvalidKey {
        backend: &'static str,
        key: String,
        reason: &'static str,
    },

    #[error("{backend} configuration error: {message}")]
    Config {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} connect failed: {source}")]
    Connect {
        backend: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("{backend} failed to acquire {kind} lock '{key}': {source}")]
    Acquire {
        backend: &'static str,
        kind: LockKind,
        key: String,
        #[source]
        source: ClientError,
    },

    #[error("{backend} failed to release {kind} lock '{key}': {source}")]
    Release {
        backend: &'static str,
        kind: LockKind,
        key: String,
        #[source]
        source: ClientError,
    },
}

impl LockError {
    /// Name of the backend that raised the error.
    pub fn backend(&self) -> &'static str {
        match self {
            LockError::NotInitialized { backend }
            | LockError::NotReady { backend }
            | LockError::Unsupported { backend, .. }
            | LockError::InvalidKey { backend, .. }
            | LockError::Config { backend, .. }
            | LockError::Connect { backend, .. }
            | LockError::Acquire { backend, .. }
            | LockError::Release { backend, .. } => *backend,
        }
    }

    /// Deterministic misuse: retrying the same request can never succeed.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            LockError::Unsupported { .. } | LockError::InvalidKey { .. } | LockError::Config { .. }
        )
    }

    /// The backend may recover; a caller-side retry policy can try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LockError::NotReady { .. } | LockError::Acquire { .. } | LockError::Release { .. }
        )
    }
}

/// Failure of a guarded invocation.
///
/// Keeps the protected operation's own error type intact so callers can tell
/// a lock problem from a business failure.
#[derive(Error, Debug)]
pub enum InvokeError<E> {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("protected operation failed: {0}")]
    Operation(E),
}

impl<E> InvokeError<E> {
    /// The operation's error, if the operation ran and failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            InvokeError::Operation(err) => Some(err),
            InvokeError::Lock(_) => None,
        }
    }

    /// The coordination error, if the operation never got to fail.
    pub fn as_lock(&self) -> Option<&LockError> {
        match self {
            InvokeError::Lock(err) => Some(err),
            InvokeError::Operation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_message_names_backend_kind_and_key() {
        let err = LockError::Unsupported {
            backend: "zookeeper",
            capability: Capability::Async,
            kind: LockKind::ReadShared,
            key: "inventory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "zookeeper doesn't support asynchronous acquisition for read-shared lock 'inventory'"
        );
        assert_eq!(err.backend(), "zookeeper");
        assert!(err.is_programming_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn not_ready_is_transient() {
        let err = LockError::NotReady { backend: "redis" };
        assert!(err.is_transient());
        assert!(!err.is_programming_error());
    }

    #[test]
    fn invoke_error_keeps_operation_error() {
        let err: InvokeError<&str> = InvokeError::Operation("boom");
        assert!(err.as_lock().is_none());
        assert_eq!(err.into_operation(), Some("boom"));

        let err: InvokeError<&str> = LockError::NotInitialized { backend: "redis" }.into();
        assert!(matches!(err.as_lock(), Some(LockError::NotInitialized { .. })));
        assert_eq!(err.into_operation(), None);
    }
}
