use std::time::Duration;

use lockgate_core::{CacheSettings, LockError, LockResult};
use serde::Deserialize;

use crate::BACKEND;

/// Digest authentication for the ensemble session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DigestCredentials {
    pub username: String,
    pub password: String,
}

/// Session, path and cache settings for the ensemble backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ZookeeperSettings {
    /// Comma-separated `host:port` list.
    pub connect_string: String,
    /// Persistent parent node of every lock path.
    pub root_path: String,
    pub session_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    pub digest: Option<DigestCredentials>,
    pub cache: CacheSettings,
}

impl Default for ZookeeperSettings {
    fn default() -> Self {
        Self {
            connect_string: "127.0.0.1:2181".to_string(),
            root_path: "/lockgate".to_string(),
            session_timeout_ms: 60_000,
            connection_timeout_ms: 15_000,
            digest: None,
            cache: CacheSettings::default(),
        }
    }
}

impl ZookeeperSettings {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Reject settings no session could be opened with.
    pub fn validate(&self) -> LockResult<()> {
        let problem = if self.connect_string.trim().is_empty() {
            Some("connect string is empty".to_string())
        } else if !self.root_path.starts_with('/') {
            Some(format!("root path {:?} must be absolute", self.root_path))
        } else if self.root_path.contains("//") {
            Some(format!("root path {:?} has an empty segment", self.root_path))
        } else if self.session_timeout_ms == 0 {
            Some("session timeout must be positive".to_string())
        } else {
            None
        };

        match problem {
            Some(message) => Err(LockError::Config {
                backend: BACKEND,
                message,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = ZookeeperSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.root_path, "/lockgate");
        assert_eq!(settings.session_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn deserializes_partial_settings() {
        let settings: ZookeeperSettings = serde_json::from_str(
            r#"{
                "connect_string": "zk1:2181,zk2:2181",
                "digest": {"username": "app", "password": "secret"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.connect_string, "zk1:2181,zk2:2181");
        assert_eq!(settings.root_path, "/lockgate");
        assert_eq!(settings.digest.unwrap().username, "app");
        assert!(settings.cache.enabled);
    }

    #[test]
    fn rejects_relative_root() {
        let settings = ZookeeperSettings {
            root_path: "lockgate".to_string(),
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, LockError::Config { backend: "zookeeper", .. }));
        assert!(err.is_programming_error());
    }

    #[test]
    fn rejects_empty_segment_and_connect_string() {
        for settings in [
            ZookeeperSettings {
                root_path: "/a//b".to_string(),
                ..Default::default()
            },
            ZookeeperSettings {
                connect_string: " ".to_string(),
                ..Default::default()
            },
        ] {
            assert!(settings.validate().is_err());
        }
    }
}
