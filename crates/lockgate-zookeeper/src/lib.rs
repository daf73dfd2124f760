//! ZooKeeper-style ensemble backend for lockgate.
//!
//! Locks live as ephemeral nodes under `{root_path}/{key}`. The ensemble
//! offers a reentrant mutex and a read/write pair per path, acquired by a
//! blocking call and held until released or until the session ends. There is
//! no lease, no fair variant and no future-based acquisition.

pub mod client;
mod config;
mod memory;
mod path;
mod strategy;

pub use client::{EnsembleClient, EnsembleConnector, EnsembleMutex, EnsembleReadWriteLock};
pub use config::{DigestCredentials, ZookeeperSettings};
pub use memory::MemoryEnsemble;
pub use path::{lock_path, NodeIdentity};
pub use strategy::{ZookeeperLockStrategy, BACKEND};
