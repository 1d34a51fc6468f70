//! A running store node.
//!
//! ## Key Responsibilities
//! - Owns the handles of the consensus, dispatcher and session server tasks
//! - Opens in-process [`Session`]s on the replicated store
//! - Leaves the cluster on request
//!
//! ## Example Usage
//! ```ignore
//! let node = NodeBuilder::from_settings(settings, shutdown_rx).build().await?;
//! let session = node.session();
//! session.set("/config/mode", Cas::Missing, "active".into()).await?;
//! ```

use std::net::SocketAddr;

use futures::future::select_all;
use tokio::task::JoinHandle;
use tracing::info;

use super::Services;
use super::Session;
use crate::ApplyOutcome;
use crate::ClientError;
use crate::ConsensusStatus;
use crate::Member;
use crate::Op;
use crate::Result;

pub struct Node {
    pub(super) me: Member,
    pub(super) services: Services,
    pub(super) tasks: Vec<JoinHandle<Result<()>>>,
}

impl Node {
    pub fn node_id(&self) -> u32 {
        self.me.node_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.me.peer_addr
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.me.client_addr
    }

    /// Opens a session with its own snapshot registry
    pub fn session(&self) -> Session {
        Session::new(self.services.clone())
    }

    pub fn status(&self) -> ConsensusStatus {
        self.services.consensus.status()
    }

    /// Waits until the consensus status satisfies `f`
    pub async fn wait_for_status(
        &self,
        f: impl FnMut(&ConsensusStatus) -> bool,
    ) -> Result<ConsensusStatus> {
        self.services.consensus.wait_for(f).await
    }

    /// Members of the latest configuration, ordered by id
    pub fn members(&self) -> Vec<Member> {
        self.services.membership.latest().members().cloned().collect()
    }

    /// Head revision applied on this node
    pub fn applied(&self) -> u64 {
        self.services.dispatcher.applied()
    }

    /// Proposes this node's removal from the cluster.
    ///
    /// The node keeps serving until it is shut down; it stops counting
    /// toward quorums `alpha` slots after the removal commits.
    pub async fn leave(&self) -> std::result::Result<u64, ClientError> {
        let node_id = self.me.node_id;
        let resolution = self.services.propose_and_wait(Op::RemoveMember { node_id }).await?;
        if resolution.outcome != ApplyOutcome::Noop {
            return Err(ClientError::Internal(format!("unexpected outcome {:?}", resolution.outcome)));
        }
        if self.services.membership.latest().contains(node_id) {
            return Err(ClientError::Internal(format!("removal of node {node_id} was rejected")));
        }
        info!(node_id, revision = resolution.revision, "left the cluster");
        Ok(resolution.revision)
    }

    /// Waits until the first node task stops and returns its result.
    pub async fn wait(self) -> Result<()> {
        if self.tasks.is_empty() {
            return Ok(());
        }
        let (result, _, _) = select_all(self.tasks).await;
        result?
    }
}
