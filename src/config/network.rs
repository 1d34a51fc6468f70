use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Transport limits for the UDP peer channel and the TCP session channel
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Largest encoded peer envelope accepted or sent (bytes)
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// Largest session frame (bytes). Join tickets carry a full store dump.
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,

    /// Largest value body accepted by `set` (bytes)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Longest path accepted by `set` and `del` (bytes)
    #[serde(default = "default_max_path_size")]
    pub max_path_size: usize,

    /// Per-connection buffer of outbound session responses
    #[serde(default = "default_response_buffer_size")]
    pub response_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: default_max_datagram_size(),
            max_frame_length: default_max_frame_length(),
            max_body_size: default_max_body_size(),
            max_path_size: default_max_path_size(),
            response_buffer_size: default_response_buffer_size(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        // IPv4 UDP payload ceiling
        if self.max_datagram_size == 0 || self.max_datagram_size > 65_507 {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_datagram_size {} must be within 1..=65507",
                self.max_datagram_size
            ))));
        }

        if self.max_body_size == 0 || self.max_body_size >= self.max_frame_length {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_body_size {} must be positive and below max_frame_length {}",
                self.max_body_size, self.max_frame_length
            ))));
        }

        if self.max_path_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_path_size must be greater than 0".into(),
            )));
        }

        if self.response_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "response_buffer_size must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_max_datagram_size() -> usize {
    65_000
}
fn default_max_frame_length() -> usize {
    64 * 1024 * 1024
}
fn default_max_body_size() -> usize {
    2048
}
fn default_max_path_size() -> usize {
    256
}
fn default_response_buffer_size() -> usize {
    256
}
