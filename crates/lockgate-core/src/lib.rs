//! Core traits and types for lockgate lock backends.
//!
//! This crate defines the pieces shared by every backend strategy:
//! - `LockKind`, `LockIdentity`, `LockRequest`: what a caller asks for
//! - `HandleCache`: create-or-fetch cache for lock handles and groups
//! - `BackendState`: the installed client and its reachability check
//! - `LockHandle` / `LockGuard`: scoped acquisition with release on every exit path
//! - `LockStrategy` + `invoke_with`: the acquire → run → release driver
//! - `local`: an in-process lock primitive backing the bundled memory clients

mod blocking;
mod cache;
mod error;
mod handle;
mod kind;
pub mod local;
mod owner;
mod request;
mod state;
mod strategy;

pub use blocking::acquire_blocking;
pub use cache::{CacheSettings, HandleCache};
pub use error::{Capability, ClientError, InvokeError, LockError, LockResult};
pub use handle::{LockGuard, LockHandle, ReleasePolicy};
pub use kind::{GroupIdentity, LockIdentity, LockKind};
pub use owner::LockOwner;
pub use request::{AcquireMode, LockOutcome, LockRequest, DEFAULT_LEASE, DEFAULT_WAIT};
pub use state::{BackendState, Reachable};
pub use strategy::{check_key, invoke_with, LockStrategy};
