use std::net::SocketAddr;
use std::time::Duration;

use super::Client;
use super::ClientConfig;
use crate::BackoffPolicy;
use crate::Result;

pub struct ClientBuilder {
    config: ClientConfig,
    addr: SocketAddr,
}

impl ClientBuilder {
    /// Create a new builder with default config for the node at `addr`
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            config: ClientConfig::default(),
            addr,
        }
    }

    /// Set the frame size limit (default: node default)
    pub fn max_frame_length(
        mut self,
        max_frame_length: usize,
    ) -> Self {
        self.config.max_frame_length = max_frame_length;
        self
    }

    /// Set request timeout (default: 10s)
    pub fn request_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set how many events a stream buffers before it is ended (default: 64)
    pub fn stream_buffer_size(
        mut self,
        size: usize,
    ) -> Self {
        self.config.stream_buffer_size = size;
        self
    }

    /// Set the connect retry policy
    pub fn connect_policy(
        mut self,
        policy: BackoffPolicy,
    ) -> Self {
        self.config.connect = policy;
        self
    }

    /// Limit connection attempts, keeping the rest of the connect policy
    pub fn connect_retries(
        mut self,
        max_retries: usize,
    ) -> Self {
        self.config.connect.max_retries = max_retries;
        self
    }

    /// Completely replaces the default configuration
    ///
    /// # Warning: Configuration Override
    /// This discards all previous settings configured through individual
    /// methods like [`request_timeout`](ClientBuilder::request_timeout).
    pub fn set_config(
        mut self,
        config: ClientConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Connect with the current configuration
    pub async fn build(self) -> Result<Client> {
        Client::connect_with(self.addr, self.config).await
    }
}
