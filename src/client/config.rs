use std::time::Duration;

use crate::BackoffPolicy;
use crate::NetworkConfig;
use crate::RetryPolicies;

/// Client connection parameters
///
/// # Defaults
/// Frame limit and connect policy match a node's defaults, so a default
/// client talks to a default node.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Largest frame sent or accepted (bytes)
    pub max_frame_length: usize,

    /// Maximum time to wait for the final response of a request.
    /// Should exceed the server's `consensus.propose_timeout_ms`.
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Retry policy of establishing the TCP connection
    pub connect: BackoffPolicy,

    /// Responses buffered per request; a stream further behind is ended with an error
    /// Default: 64
    pub stream_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_length: NetworkConfig::default().max_frame_length,
            request_timeout: Duration::from_secs(10),
            connect: RetryPolicies::default().connect,
            stream_buffer_size: 64,
        }
    }
}
