use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Multi-Paxos timing and windowing parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConsensusConfig {
    /// Pipelining window of the leader and activation delay of membership changes.
    ///
    /// A membership change committed at slot `s` governs slots `>= s + alpha`.
    #[serde(default = "default_alpha")]
    pub alpha: u64,

    /// Resolution of the consensus event loop timer
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Interval between leader heartbeats
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Lower bound of the randomized election timeout
    #[serde(default = "default_election_timeout_min_ms")]
    pub election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout
    #[serde(default = "default_election_timeout_max_ms")]
    pub election_timeout_max_ms: u64,

    /// Retransmission interval of unacknowledged Prepare and Accept messages
    #[serde(default = "default_accept_retry_ms")]
    pub accept_retry_ms: u64,

    /// How long a learner waits on a gap before fetching the missing slots
    #[serde(default = "default_fill_timeout_ms")]
    pub fill_timeout_ms: u64,

    /// Interval between re-forwards of a pending proposal to the leader
    #[serde(default = "default_forward_retry_ms")]
    pub forward_retry_ms: u64,

    /// Overall deadline of a single proposal
    #[serde(default = "default_propose_timeout_ms")]
    pub propose_timeout_ms: u64,

    /// Maximum routing attempts of a single proposal
    #[serde(default = "default_max_propose_attempts")]
    pub max_propose_attempts: u32,

    /// Silence after which the leader considers a member dead
    #[serde(default = "default_member_timeout_ms")]
    pub member_timeout_ms: u64,

    /// Whether the leader proposes `RemoveMember` for dead members
    #[serde(default)]
    pub auto_evict: bool,

    /// Number of learned slots kept behind the frontier for gap filling
    #[serde(default = "default_log_retention")]
    pub log_retention: u64,

    /// Capacity of the consensus event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            tick_interval_ms: default_tick_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            election_timeout_min_ms: default_election_timeout_min_ms(),
            election_timeout_max_ms: default_election_timeout_max_ms(),
            accept_retry_ms: default_accept_retry_ms(),
            fill_timeout_ms: default_fill_timeout_ms(),
            forward_retry_ms: default_forward_retry_ms(),
            propose_timeout_ms: default_propose_timeout_ms(),
            max_propose_attempts: default_max_propose_attempts(),
            member_timeout_ms: default_member_timeout_ms(),
            auto_evict: false,
            log_retention: default_log_retention(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.alpha == 0 {
            return Err(Error::Config(ConfigError::Message(
                "consensus.alpha must be at least 1".into(),
            )));
        }

        if self.tick_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "consensus.tick_interval_ms must be greater than 0".into(),
            )));
        }

        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "election_timeout_min_ms ({}) must be less than election_timeout_max_ms ({})",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            ))));
        }

        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "heartbeat_interval_ms ({}) must be less than election_timeout_min_ms ({})",
                self.heartbeat_interval_ms, self.election_timeout_min_ms
            ))));
        }

        if self.log_retention < self.alpha {
            return Err(Error::Config(ConfigError::Message(format!(
                "log_retention ({}) must be at least alpha ({})",
                self.log_retention, self.alpha
            ))));
        }

        if self.max_propose_attempts == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_propose_attempts must be at least 1".into(),
            )));
        }

        if self.auto_evict && self.member_timeout_ms <= self.election_timeout_max_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "member_timeout_ms ({}) must exceed election_timeout_max_ms ({}) when auto_evict is on",
                self.member_timeout_ms, self.election_timeout_max_ms
            ))));
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn election_timeout_range(&self) -> (u64, u64) {
        (self.election_timeout_min_ms, self.election_timeout_max_ms)
    }
}

fn default_alpha() -> u64 {
    16
}
fn default_tick_interval_ms() -> u64 {
    10
}
fn default_heartbeat_interval_ms() -> u64 {
    50
}
fn default_election_timeout_min_ms() -> u64 {
    300
}
fn default_election_timeout_max_ms() -> u64 {
    600
}
fn default_accept_retry_ms() -> u64 {
    100
}
fn default_fill_timeout_ms() -> u64 {
    200
}
fn default_forward_retry_ms() -> u64 {
    200
}
fn default_propose_timeout_ms() -> u64 {
    5000
}
fn default_max_propose_attempts() -> u32 {
    20
}
fn default_member_timeout_ms() -> u64 {
    5000
}
fn default_log_retention() -> u64 {
    10_000
}
fn default_event_channel_capacity() -> usize {
    1024
}
