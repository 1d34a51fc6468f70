use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Versioned store parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Number of past revisions kept readable without a snapshot
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Number of revisions during which a proposal tag is remembered.
    ///
    /// A tag seen again inside this window is applied as a no-op.
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            dedupe_window: default_dedupe_window(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_window == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.history_window must be at least 1".into(),
            )));
        }
        Ok(())
    }
}

/// Watch subscription parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Bounded queue between the dispatcher and a subscriber worker
    #[serde(default = "default_subscriber_queue_size")]
    pub subscriber_queue_size: usize,

    /// Buffer between a subscriber worker and the consumer
    #[serde(default = "default_consumer_buffer_size")]
    pub consumer_buffer_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_size: default_subscriber_queue_size(),
            consumer_buffer_size: default_consumer_buffer_size(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.subscriber_queue_size == 0 || self.consumer_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch queue sizes must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_history_window() -> usize {
    1024
}
fn default_dedupe_window() -> u64 {
    4096
}
fn default_subscriber_queue_size() -> usize {
    64
}
fn default_consumer_buffer_size() -> usize {
    64
}
