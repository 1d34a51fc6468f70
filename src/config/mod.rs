//! Configuration management for a coordination store node.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod cluster;
mod consensus;
mod network;
mod retry;
mod store;
pub use cluster::*;
pub use consensus::*;
pub use network::*;
pub use retry::*;
pub use store::*;


use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Environment variable prefix, e.g. `DSTORE__CLUSTER__NODE_ID=3`
pub(crate) const ENV_PREFIX: &str = "DSTORE";

/// Main configuration container of a store node.
///
/// Sources are merged with the following priority:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Node identity, addresses and bootstrap mode
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Paxos timing, pipelining window and retention
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// Datagram and frame limits
    #[serde(default)]
    pub network: NetworkConfig,
    /// Versioned store history and dedupe window
    #[serde(default)]
    pub store: StoreConfig,
    /// Watch subscriber queues
    #[serde(default)]
    pub watch: WatchConfig,
    /// Retry policies for distributed operations
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Debug for Settings {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Settings").field("cluster", &self.cluster).finish()
    }
}

impl Settings {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so callers can apply further overrides through
    /// [`Settings::with_override_config`]. Call [`Settings::validate`] before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/n1.toml");
    /// std::env::set_var("DSTORE__CLUSTER__NODE_ID", "3");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies an additional configuration file on top of the current values.
    ///
    /// Environment variables are re-applied last so they keep the highest priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and the cross-section constraints.
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.consensus.validate()?;
        self.network.validate()?;
        self.store.validate()?;
        self.watch.validate()?;
        self.retry.validate()?;

        // A full Promise carries up to alpha accepted values in one datagram
        let per_value = self.network.max_body_size + self.network.max_path_size;
        let promise_budget = self.consensus.alpha as usize * per_value;
        if promise_budget + PROMISE_OVERHEAD > self.network.max_datagram_size {
            return Err(Error::Config(ConfigError::Message(format!(
                "consensus.alpha ({}) * (network.max_body_size ({}) + network.max_path_size ({})) exceeds network.max_datagram_size ({})",
                self.consensus.alpha,
                self.network.max_body_size,
                self.network.max_path_size,
                self.network.max_datagram_size
            ))));
        }

        if self.store.dedupe_window < self.consensus.alpha {
            return Err(Error::Config(ConfigError::Message(format!(
                "store.dedupe_window ({}) must be at least consensus.alpha ({})",
                self.store.dedupe_window, self.consensus.alpha
            ))));
        }

        Ok(self)
    }
}

/// Envelope and round framing reserved for the accepted values of a Promise.
const PROMISE_OVERHEAD: usize = 4096;

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} path cannot be empty"
        ))));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                Error::Config(ConfigError::Message(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                )))
            })?;
        }
    }

    Ok(())
}
