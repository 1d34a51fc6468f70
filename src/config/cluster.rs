use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::Result;

/// Node identity and bootstrap parameters
///
/// # Defaults
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Unique node identifier in cluster. A node that left must rejoin under a new id.
    #[serde(default = "default_node_id")]
    pub node_id: u32,

    /// UDP address for consensus traffic
    ///
    /// Default: 127.0.0.1:8046
    #[serde(default = "default_peer_addr")]
    pub peer_address: SocketAddr,

    /// TCP address serving client sessions and join requests
    ///
    /// Default: 127.0.0.1:8047
    #[serde(default = "default_client_addr")]
    pub client_address: SocketAddr,

    /// Client address of an existing member.
    ///
    /// When unset the node bootstraps a fresh cluster as its single seed member.
    #[serde(default)]
    pub join_address: Option<SocketAddr>,

    /// Root directory of the acceptor database.
    ///
    /// When unset acceptor state lives in a temporary database removed on exit.
    #[serde(default)]
    pub db_root_dir: Option<PathBuf>,

    /// Log files output directory
    ///
    /// Default: ./logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            peer_address: default_peer_addr(),
            client_address: default_client_addr(),
            join_address: None,
            db_root_dir: None,
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    /// Validates node identity and addresses
    /// # Errors
    /// Returns `Error::Config` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node_id cannot be 0 (reserved for anonymous proposals)".into(),
            )));
        }

        if self.peer_address == self.client_address {
            return Err(Error::Config(ConfigError::Message(format!(
                "peer_address and client_address must differ (both {})",
                self.peer_address
            ))));
        }

        if let Some(join) = self.join_address {
            if join == self.client_address {
                return Err(Error::Config(ConfigError::Message(
                    "join_address must point at another member".into(),
                )));
            }
        }

        if let Some(dir) = &self.db_root_dir {
            validate_directory(dir, "db_root_dir")?;
        }
        validate_directory(&self.log_dir, "log_dir")?;

        Ok(())
    }

    /// Whether this node bootstraps a fresh cluster
    pub fn is_seed(&self) -> bool {
        self.join_address.is_none()
    }
}

fn default_node_id() -> u32 {
    1
}
fn default_peer_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8046))
}
fn default_client_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8047))
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
