use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;

use super::ConsensusEvent;
use super::ConsensusStatus;
use super::Proposal;
use super::Tag;
use crate::ClientError;
use crate::ConsensusError;
use crate::MembershipSnapshot;
use crate::Result;

/// Issues unique tags for proposals submitted through this node
#[derive(Debug, Clone)]
pub(crate) struct TagSource {
    node_id: u32,
    incarnation: u64,
    seq: Arc<AtomicU64>,
}

impl TagSource {
    pub(crate) fn new(node_id: u32) -> Self {
        Self {
            node_id,
            incarnation: rand::random::<u64>() | 1,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn next(&self) -> Tag {
        Tag {
            node_id: self.node_id,
            incarnation: self.incarnation,
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }
}

/// Cloneable front door to the consensus task.
#[derive(Debug, Clone)]
pub struct ConsensusHandle {
    tags: TagSource,
    event_tx: mpsc::Sender<ConsensusEvent>,
    status_rx: watch::Receiver<ConsensusStatus>,
    propose_timeout: Duration,
}

impl ConsensusHandle {
    pub(crate) fn new(
        tags: TagSource,
        event_tx: mpsc::Sender<ConsensusEvent>,
        status_rx: watch::Receiver<ConsensusStatus>,
        propose_timeout: Duration,
    ) -> Self {
        Self {
            tags,
            event_tx,
            status_rx,
            propose_timeout,
        }
    }

    pub fn next_tag(&self) -> Tag {
        self.tags.next()
    }

    /// Submits a proposal and waits until it is learned.
    ///
    /// Returns the slot it was learned at. A learned proposal may still have
    /// been a duplicate of an earlier slot; the dispatcher decides that.
    ///
    /// # Errors
    /// `ClientError::Unavailable` if no quorum ordered it in time.
    pub async fn propose(
        &self,
        proposal: Proposal,
    ) -> Result<u64> {
        let tag = proposal.tag;
        let (resp, rx) = oneshot::channel();
        self.event_tx
            .send(ConsensusEvent::Propose { proposal, resp })
            .await
            .map_err(|_| ConsensusError::Stopped)?;

        // The consensus task fails the proposal at its own deadline; this is a backstop.
        match tokio::time::timeout(self.propose_timeout * 2, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConsensusError::Stopped.into()),
            Err(_) => {
                debug!(%tag, "proposal timed out");
                Err(ClientError::Unavailable(format!("proposal {tag} timed out")).into())
            }
        }
    }

    /// Installs a join ticket's revision and membership into the consensus task
    pub async fn restore(
        &self,
        revision: u64,
        membership: MembershipSnapshot,
    ) -> Result<()> {
        let (resp, rx) = oneshot::channel();
        self.event_tx
            .send(ConsensusEvent::Restore {
                revision,
                membership,
                resp,
            })
            .await
            .map_err(|_| ConsensusError::Stopped)?;
        rx.await.map_err(|_| ConsensusError::Stopped)?;
        Ok(())
    }

    pub fn status(&self) -> ConsensusStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConsensusStatus> {
        self.status_rx.clone()
    }

    /// Waits until the status satisfies `f`
    pub async fn wait_for(
        &self,
        f: impl FnMut(&ConsensusStatus) -> bool,
    ) -> Result<ConsensusStatus> {
        let mut rx = self.status_rx.clone();
        let status = rx.wait_for(f).await.map_err(|_| ConsensusError::Stopped)?;
        Ok(*status)
    }
}
