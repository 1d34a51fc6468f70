use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::TagWindow;
use super::WatchRegistry;
use super::WatchStream;
use crate::ApplyOutcome;
use crate::Committed;
use crate::ConsensusError;
use crate::Glob;
use crate::MembershipSnapshot;
use crate::Op;
use crate::Result;
use crate::StorageError;
use crate::Tag;
use crate::Value;
use crate::VersionedStore;

/// Everything a joining node needs to start at `revision + 1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTicket {
    pub revision: u64,
    pub membership: MembershipSnapshot,
    /// Tags applied within the dedupe window, oldest first
    pub dedupe: Vec<(u64, Tag)>,
    pub entries: Vec<(String, Value)>,
}

/// Outcome of a proposal once applied, handed to the local waiter
#[derive(Debug)]
pub struct Resolution {
    pub revision: u64,
    pub outcome: ApplyOutcome,
    /// Present for an accepted `AddMember`
    pub ticket: Option<Box<JoinTicket>>,
}

type Waiters = Arc<DashMap<Tag, oneshot::Sender<Resolution>>>;

/// Sole writer of the store.
///
/// Applies committed entries strictly in revision order, then notifies
/// watchers, then the proposer waiting on the entry's tag.
pub struct Dispatcher {
    store: Arc<VersionedStore>,
    dedupe: TagWindow,
    committed_rx: mpsc::UnboundedReceiver<Committed>,
    applied_tx: watch::Sender<u64>,
    watches: Arc<WatchRegistry>,
    waiters: Waiters,
    shutdown_signal: watch::Receiver<()>,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Arc<VersionedStore>,
        dedupe_window: u64,
        watches: Arc<WatchRegistry>,
        committed_rx: mpsc::UnboundedReceiver<Committed>,
        shutdown_signal: watch::Receiver<()>,
    ) -> (Self, DispatcherHandle) {
        let (applied_tx, applied_rx) = watch::channel(store.revision());
        let waiters: Waiters = Arc::new(DashMap::new());
        let handle = DispatcherHandle {
            store: store.clone(),
            watches: watches.clone(),
            waiters: waiters.clone(),
            applied_rx,
        };
        let dispatcher = Self {
            store,
            dedupe: TagWindow::new(dedupe_window),
            committed_rx,
            applied_tx,
            watches,
            waiters,
            shutdown_signal,
        };
        (dispatcher, handle)
    }

    /// Installs a join ticket before the first committed entry is applied
    pub(crate) fn restore(
        &mut self,
        ticket: JoinTicket,
    ) {
        info!(revision = ticket.revision, entries = ticket.entries.len(), "restoring store from join ticket");
        self.store.restore(ticket.revision, ticket.entries);
        self.dedupe.restore(ticket.dedupe);
        self.applied_tx.send_replace(ticket.revision);
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_signal.changed() => {
                    warn!("dispatcher shutdown signal received");
                    return Ok(());
                }
                committed = self.committed_rx.recv() => {
                    match committed {
                        Some(c) => {
                            if let Err(e) = self.apply(c).await {
                                error!(error = %e, "dispatcher stopped on apply failure");
                                return Err(e);
                            }
                        }
                        None => {
                            debug!("committed channel closed, dispatcher stopped");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn apply(
        &mut self,
        committed: Committed,
    ) -> Result<()> {
        let Committed {
            revision,
            proposal,
            membership,
        } = committed;

        let head = self.store.revision();
        if revision <= head {
            // a joiner may receive entries its ticket already covers
            trace!(revision, head, "entry already applied");
            return Ok(());
        }
        if revision != head + 1 {
            return Err(StorageError::OutOfOrder {
                expected: head + 1,
                actual: revision,
            }
            .into());
        }

        let outcome = if self.dedupe.admit(revision, proposal.tag) {
            self.store.apply(revision, &proposal.op)?
        } else {
            debug!(revision, tag = %proposal.tag, "duplicate proposal applied as no-op");
            self.store.apply(revision, &Op::Nop)?
        };
        self.applied_tx.send_replace(revision);

        if let ApplyOutcome::Applied { event, .. } = &outcome {
            self.watches.publish(event).await;
        }

        if let Some((_, waiter)) = self.waiters.remove(&proposal.tag) {
            let ticket = match (&proposal.op, membership) {
                (Op::AddMember(_), Some(membership)) => Some(Box::new(JoinTicket {
                    revision,
                    membership,
                    dedupe: self.dedupe.entries(),
                    entries: self.store.head().entries(),
                })),
                _ => None,
            };
            let _ = waiter.send(Resolution {
                revision,
                outcome,
                ticket,
            });
        }
        Ok(())
    }
}

/// Cloneable access to the dispatcher's outputs
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    store: Arc<VersionedStore>,
    watches: Arc<WatchRegistry>,
    waiters: Waiters,
    applied_rx: watch::Receiver<u64>,
}

impl DispatcherHandle {
    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.store
    }

    /// Registers interest in the outcome of `tag`. Must precede the proposal.
    pub fn register(
        &self,
        tag: Tag,
    ) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(tag, tx);
        rx
    }

    pub fn forget(
        &self,
        tag: &Tag,
    ) {
        self.waiters.remove(tag);
    }

    pub fn applied(&self) -> u64 {
        *self.applied_rx.borrow()
    }

    /// Waits until everything up to `revision` is applied
    pub async fn wait_applied(
        &self,
        revision: u64,
    ) -> Result<u64> {
        let mut rx = self.applied_rx.clone();
        let applied = rx
            .wait_for(|applied| *applied >= revision)
            .await
            .map_err(|_| ConsensusError::Stopped)?;
        Ok(*applied)
    }

    pub fn watch(
        &self,
        glob: Glob,
    ) -> WatchStream {
        self.watches.subscribe(glob, &self.store)
    }

    pub fn watches(&self) -> &Arc<WatchRegistry> {
        &self.watches
    }
}
