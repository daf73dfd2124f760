use std::time::Duration;

use clap::Parser;
use lockgate::redis::MemoryStore;
use lockgate::zookeeper::MemoryEnsemble;
use lockgate::{LockCoordinator, LockKind, LockRequest, RedisSettings, ZookeeperSettings};

/// Configuration for the lockgate contention simulator.
#[derive(Parser, Debug, Clone)]
#[command(name = "lockgate-sim")]
#[command(about = "Run concurrent workers through a lockgate coordinator and report the outcome")]
pub struct Config {
    /// Lock backend: redis or zookeeper (in-process clients)
    #[arg(long, default_value = "redis", env = "LOCKGATE_BACKEND")]
    pub backend: BackendKind,

    /// Lock key every worker contends for
    #[arg(long, default_value = "orders:42", env = "LOCKGATE_KEY")]
    pub key: String,

    /// Lock kind: exclusive, read or write
    #[arg(long, default_value = "exclusive", env = "LOCKGATE_KIND")]
    pub kind: KindArg,

    /// Number of concurrent workers
    #[arg(long, default_value = "4", env = "LOCKGATE_WORKERS")]
    pub workers: usize,

    /// Invocations per worker
    #[arg(long, default_value = "1", env = "LOCKGATE_ROUNDS")]
    pub rounds: usize,

    /// How long a worker waits for the lock
    #[arg(long, default_value = "1000", env = "LOCKGATE_WAIT_MS")]
    pub wait_ms: u64,

    /// Lease on the lock (redis only)
    #[arg(long, default_value = "5000", env = "LOCKGATE_LEASE_MS")]
    pub lease_ms: u64,

    /// How long the protected operation runs
    #[arg(long, default_value = "50", env = "LOCKGATE_HOLD_MS")]
    pub hold_ms: u64,

    /// Request a fair lock
    #[arg(long)]
    pub fair: bool,

    /// Acquire through the client's future instead of a blocking call
    #[arg(long = "async")]
    pub async_mode: bool,

    /// Root node of lock paths (zookeeper only)
    #[arg(long, default_value = "/lockgate", env = "LOCKGATE_ROOT_PATH")]
    pub root_path: String,

    /// Create a fresh handle per call instead of reusing cached ones
    #[arg(long)]
    pub no_handle_cache: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl Config {
    pub fn request(&self) -> LockRequest {
        LockRequest::new(self.kind.into(), self.key.clone())
            .with_wait(Duration::from_millis(self.wait_ms))
            .with_lease(Duration::from_millis(self.lease_ms))
            .asynchronous(self.async_mode)
            .fair(self.fair)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// Coordinator over the in-process client of the selected backend.
    pub fn coordinator(&self) -> LockCoordinator {
        match self.backend {
            BackendKind::Redis => {
                let mut settings = RedisSettings::default();
                settings.cache.enabled = !self.no_handle_cache;
                LockCoordinator::redis(settings, MemoryStore::new().connector())
            }
            BackendKind::Zookeeper => {
                let mut settings = ZookeeperSettings {
                    root_path: self.root_path.clone(),
                    ..Default::default()
                };
                settings.cache.enabled = !self.no_handle_cache;
                LockCoordinator::zookeeper(settings, MemoryEnsemble::new().connector())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    Redis,
    Zookeeper,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Redis => write!(f, "redis"),
            BackendKind::Zookeeper => write!(f, "zookeeper"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    Exclusive,
    Read,
    Write,
}

impl From<KindArg> for LockKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Exclusive => LockKind::Exclusive,
            KindArg::Read => LockKind::ReadShared,
            KindArg::Write => LockKind::WriteExclusive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_an_exclusive_request() {
        let config = Config::try_parse_from(["lockgate-sim"]).unwrap();
        let request = config.request();
        assert_eq!(request.kind, LockKind::Exclusive);
        assert_eq!(request.key, "orders:42");
        assert_eq!(request.wait, Duration::from_millis(1000));
        assert_eq!(request.lease, Duration::from_millis(5000));
        assert!(!request.fair);
        assert!(!request.is_async());
    }

    #[test]
    fn flags_map_onto_the_request() {
        let config = Config::try_parse_from([
            "lockgate-sim",
            "--backend",
            "zookeeper",
            "--kind",
            "read",
            "--key",
            "inventory",
            "--async",
            "--fair",
        ])
        .unwrap();
        assert_eq!(config.backend, BackendKind::Zookeeper);
        let request = config.request();
        assert_eq!(request.kind, LockKind::ReadShared);
        assert!(request.is_async());
        assert!(request.fair);
        assert_eq!(config.coordinator().backend_name(), "zookeeper");
    }
}
