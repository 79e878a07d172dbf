use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for a [`crate::DocumentStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_collection_fields")]
    pub collection_fields: Vec<String>,
    #[serde(default)]
    pub conflict_retry: ConflictRetryConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: default_max_blob_bytes(),
            cache_ttl_secs: default_cache_ttl_secs(),
            collection_fields: default_collection_fields(),
            conflict_retry: ConflictRetryConfig::default(),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_max_blob_bytes() -> usize {
    crate::storage::DEFAULT_MAX_BLOB_BYTES
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_collection_fields() -> Vec<String> {
    crate::storage::DEFAULT_COLLECTION_FIELDS
        .iter()
        .map(|name| name.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ConflictRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

/// Transport-level backoff for throttled requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}
