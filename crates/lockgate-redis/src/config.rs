use lockgate_core::CacheSettings;
use serde::Deserialize;

/// Connection and cache settings for the Redis-style backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// Store addresses, e.g. `redis://127.0.0.1:6379`. More than one means a
    /// cluster or sentinel deployment; the connector decides which.
    pub addresses: Vec<String>,
    pub password: Option<String>,
    pub database: u32,
    pub cache: CacheSettings,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            addresses: vec!["redis://127.0.0.1:6379".to_string()],
            password: None,
            database: 0,
            cache: CacheSettings::default(),
        }
    }
}
