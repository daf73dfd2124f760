//! Redis-style store backend for lockgate.
//!
//! The store offers plain and fair exclusive locks plus read/write groups,
//! each with a lease, acquired either by a blocking call or through a future.
//! The production client is an external collaborator described by the traits
//! in [`client`]; [`MemoryStore`] is an in-process stand-in with the same
//! semantics.

pub mod client;
mod config;
mod memory;
mod strategy;

pub use client::{StoreClient, StoreConnector, StoreLock, StoreReadWriteLock};
pub use config::RedisSettings;
pub use memory::MemoryStore;
pub use strategy::{RedisLockStrategy, BACKEND};
