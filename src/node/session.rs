//! In-process client operations.
//!
//! A [`Session`] is what one client connection sees: the shared replicated
//! store plus a private set of snapshots released when the session drops.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::storage::validate_path;
use crate::storage::PING_PATH;
use crate::ApplyOutcome;
use crate::Cas;
use crate::ClientError;
use crate::ClusterMembership;
use crate::ConsensusHandle;
use crate::DispatcherHandle;
use crate::Event;
use crate::Glob;
use crate::JoinTicket;
use crate::Member;
use crate::Op;
use crate::Proposal;
use crate::ReadResult;
use crate::Resolution;
use crate::Settings;
use crate::SnapshotRegistry;
use crate::WatchStream;

type ClientResult<T> = std::result::Result<T, ClientError>;

/// Node-wide handles shared by every session
#[derive(Debug, Clone)]
pub(crate) struct Services {
    pub(crate) consensus: ConsensusHandle,
    pub(crate) dispatcher: DispatcherHandle,
    pub(crate) membership: Arc<ClusterMembership>,
    pub(crate) settings: Arc<Settings>,
}

impl Services {
    fn propose_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.consensus.propose_timeout_ms)
    }

    /// Proposes `op` and waits until the dispatcher has applied it.
    pub(crate) async fn propose_and_wait(
        &self,
        op: Op,
    ) -> ClientResult<Resolution> {
        let tag = self.consensus.next_tag();
        // registered first: the entry may be applied before `propose` returns
        let waiter = self.dispatcher.register(tag);

        if let Err(e) = self.consensus.propose(Proposal::new(tag, op)).await {
            self.dispatcher.forget(&tag);
            debug!(%tag, error = %e, "proposal failed");
            return Err(e.into_client_error());
        }

        match timeout(self.propose_timeout(), waiter).await {
            Ok(Ok(resolution)) => Ok(resolution),
            Ok(Err(_)) => Err(ClientError::Unavailable("dispatcher stopped".into())),
            Err(_) => {
                self.dispatcher.forget(&tag);
                Err(ClientError::Unavailable(format!("proposal {tag} not applied in time")))
            }
        }
    }

    /// Waits until every entry this node has learned is applied.
    pub(crate) async fn sync_head(&self) -> ClientResult<u64> {
        let frontier = self.consensus.status().frontier;
        match timeout(self.propose_timeout(), self.dispatcher.wait_applied(frontier)).await {
            Ok(Ok(applied)) => Ok(applied),
            Ok(Err(e)) => Err(e.into_client_error()),
            Err(_) => Err(ClientError::Unavailable(format!(
                "revision {frontier} not applied in time"
            ))),
        }
    }
}

/// Client operation surface of one node
#[derive(Debug)]
pub struct Session {
    services: Services,
    snapshots: SnapshotRegistry,
}

impl Session {
    pub(crate) fn new(services: Services) -> Self {
        Self {
            services,
            snapshots: SnapshotRegistry::new(),
        }
    }

    /// Round trip that touches no state; returns the applied head revision
    pub fn noop(&self) -> u64 {
        self.services.dispatcher.applied()
    }

    /// Reads `path` at the head (`snap_id` 0) or in a snapshot of this session.
    pub async fn get(
        &self,
        path: &str,
        snap_id: u32,
    ) -> ClientResult<ReadResult> {
        validate_path(path)?;
        if snap_id == 0 {
            self.services.sync_head().await?;
            return Ok(self.services.dispatcher.store().read(path));
        }
        Ok(self.snapshots.get(snap_id)?.read(path))
    }

    /// Writes `body` at `path` if its current cas satisfies `cas`.
    ///
    /// Returns the new cas. A failed precondition still consumes a revision.
    pub async fn set(
        &self,
        path: &str,
        cas: Cas,
        body: Bytes,
    ) -> ClientResult<Cas> {
        self.check_write(path, cas)?;
        let max = self.services.settings.network.max_body_size;
        if body.len() > max {
            return Err(ClientError::PayloadTooLarge { size: body.len(), max });
        }

        let resolution = self
            .services
            .propose_and_wait(Op::Set {
                path: path.to_string(),
                cas,
                body,
            })
            .await?;
        match resolution.outcome {
            ApplyOutcome::Applied { cas, .. } => Ok(cas),
            ApplyOutcome::Noop => Ok(self.services.dispatcher.store().head().cas(path)),
            outcome => Err(rejection(outcome)),
        }
    }

    /// Deletes `path` if its current cas satisfies `cas`; returns the revision.
    pub async fn del(
        &self,
        path: &str,
        cas: Cas,
    ) -> ClientResult<u64> {
        self.check_write(path, cas)?;
        let resolution = self
            .services
            .propose_and_wait(Op::Del {
                path: path.to_string(),
                cas,
            })
            .await?;
        match resolution.outcome {
            ApplyOutcome::Applied { .. } | ApplyOutcome::Noop => Ok(resolution.revision),
            outcome => Err(rejection(outcome)),
        }
    }

    /// Pins the current head; returns `(snapshot id, revision)`
    pub async fn snap(&self) -> ClientResult<(u32, u64)> {
        self.services.sync_head().await?;
        let version = self.services.dispatcher.store().head();
        let revision = version.revision();
        Ok((self.snapshots.pin(version), revision))
    }

    pub fn del_snap(
        &self,
        snap_id: u32,
    ) -> ClientResult<()> {
        self.snapshots.release(snap_id)
    }

    /// Streams every mutation matching `pattern` committed from now on
    pub fn watch(
        &self,
        pattern: &str,
    ) -> ClientResult<WatchStream> {
        let glob = Glob::compile(pattern)?;
        Ok(self.services.dispatcher.watch(glob))
    }

    /// Every file matching `pattern` at the current head, in sorted order
    pub async fn walk(
        &self,
        pattern: &str,
    ) -> ClientResult<Vec<Event>> {
        let glob = Glob::compile(pattern)?;
        self.services.sync_head().await?;
        Ok(self.services.dispatcher.store().head().walk(&glob))
    }

    /// Admits `member` into the cluster and returns the state it starts from
    pub async fn join(
        &self,
        member: Member,
    ) -> ClientResult<JoinTicket> {
        if member.node_id == 0 {
            return Err(ClientError::JoinRejected("node id 0 is reserved".into()));
        }
        let latest = self.services.membership.latest();
        match latest.get(member.node_id) {
            Some(existing) if *existing != member => {
                return Err(ClientError::JoinRejected(format!(
                    "node {} is already a member at other addresses",
                    member.node_id
                )));
            }
            // a retry whose first admission committed; it gets a fresh ticket
            Some(_) => debug!(node_id = member.node_id, "member already admitted, re-issuing ticket"),
            None => {}
        }

        let node_id = member.node_id;
        let resolution = self.services.propose_and_wait(Op::AddMember(member)).await?;
        match resolution.ticket {
            Some(ticket) => Ok(*ticket),
            None => {
                warn!(node_id, revision = resolution.revision, "join not applied");
                Err(ClientError::JoinRejected(format!(
                    "node {node_id} was not admitted at revision {}",
                    resolution.revision
                )))
            }
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    fn check_write(
        &self,
        path: &str,
        cas: Cas,
    ) -> ClientResult<()> {
        validate_path(path)?;
        if path.len() > self.services.settings.network.max_path_size {
            return Err(ClientError::InvalidPath {
                path: path.to_string(),
                reason: "longer than max_path_size",
            });
        }
        if cas == Cas::Dir {
            return Err(ClientError::InvalidCas(cas));
        }
        if path == PING_PATH {
            return Err(ClientError::ReadOnly(path.to_string()));
        }
        Ok(())
    }
}

fn rejection(outcome: ApplyOutcome) -> ClientError {
    match outcome {
        ApplyOutcome::PreconditionFailed { current } => ClientError::PreconditionFailed { current },
        ApplyOutcome::Rejected(e) => e,
        other => ClientError::Internal(format!("unexpected outcome {other:?}")),
    }
}
