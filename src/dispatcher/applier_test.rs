use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::watch;

use super::Dispatcher;
use super::DispatcherHandle;
use super::JoinTicket;
use super::WatchRegistry;
use crate::test_utils::member;
use crate::test_utils::static_membership;
use crate::ApplyOutcome;
use crate::Cas;
use crate::Committed;
use crate::Error;
use crate::Glob;
use crate::Op;
use crate::Proposal;
use crate::StorageError;
use crate::SystemError;
use crate::Tag;
use crate::VersionedStore;
use crate::WatchConfig;

struct Harness {
    committed_tx: mpsc::UnboundedSender<Committed>,
    handle: DispatcherHandle,
    task: tokio::task::JoinHandle<crate::Result<()>>,
    _shutdown_tx: watch::Sender<()>,
}

fn harness_with(ticket: Option<JoinTicket>) -> Harness {
    let store = Arc::new(VersionedStore::new(64));
    let watches = Arc::new(WatchRegistry::new(WatchConfig {
        subscriber_queue_size: 16,
        consumer_buffer_size: 16,
    }));
    let (committed_tx, committed_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (mut dispatcher, handle) = Dispatcher::new(store, 128, watches, committed_rx, shutdown_rx);
    if let Some(ticket) = ticket {
        dispatcher.restore(ticket);
    }
    Harness {
        committed_tx,
        handle,
        task: tokio::spawn(dispatcher.run()),
        _shutdown_tx: shutdown_tx,
    }
}

fn tag(seq: u64) -> Tag {
    Tag {
        node_id: 1,
        incarnation: 3,
        seq,
    }
}

fn set(
    seq: u64,
    path: &str,
    cas: Cas,
) -> Proposal {
    Proposal::new(
        tag(seq),
        Op::Set {
            path: path.into(),
            cas,
            body: Bytes::from(format!("v{seq}")),
        },
    )
}

fn commit(
    revision: u64,
    proposal: Proposal,
) -> Committed {
    Committed {
        revision,
        proposal,
        membership: None,
    }
}

#[tokio::test]
async fn test_waiter_receives_outcome_after_apply() {
    let h = harness_with(None);
    let waiter = h.handle.register(tag(1));
    h.committed_tx.send(commit(1, set(1, "/a", Cas::Missing))).unwrap();

    let resolution = waiter.await.unwrap();
    assert_eq!(resolution.revision, 1);
    assert!(matches!(resolution.outcome, ApplyOutcome::Applied { cas: Cas::Rev(1), .. }));
    assert!(resolution.ticket.is_none());
    assert_eq!(h.handle.applied(), 1);
    assert_eq!(h.handle.store().read("/a").cas, Cas::Rev(1));
}

#[tokio::test]
async fn test_failed_precondition_still_consumes_revision() {
    let h = harness_with(None);
    h.committed_tx.send(commit(1, set(1, "/a", Cas::Missing))).unwrap();
    let failed = h.handle.register(tag(2));
    h.committed_tx.send(commit(2, set(2, "/a", Cas::Missing))).unwrap();
    let ok = h.handle.register(tag(3));
    h.committed_tx.send(commit(3, set(3, "/a", Cas::Rev(1)))).unwrap();

    let failed = failed.await.unwrap();
    assert_eq!(failed.outcome, ApplyOutcome::PreconditionFailed { current: Cas::Rev(1) });
    let ok = ok.await.unwrap();
    assert!(matches!(ok.outcome, ApplyOutcome::Applied { cas: Cas::Rev(3), .. }));
}

#[tokio::test]
async fn test_duplicate_tag_applies_as_noop() {
    let h = harness_with(None);
    h.committed_tx.send(commit(1, set(1, "/a", Cas::Clobber))).unwrap();
    let dup = h.handle.register(tag(1));
    h.committed_tx.send(commit(2, set(1, "/a", Cas::Clobber))).unwrap();

    let dup = dup.await.unwrap();
    assert_eq!(dup.revision, 2);
    assert_eq!(dup.outcome, ApplyOutcome::Noop);
    assert_eq!(h.handle.store().read("/a").cas, Cas::Rev(1));
    assert_eq!(h.handle.store().revision(), 2);
}

#[tokio::test]
async fn test_watchers_see_events_before_waiter_resolves() {
    let h = harness_with(None);
    let mut stream = h.handle.watch(Glob::compile("/w/*").unwrap());
    let waiter = h.handle.register(tag(1));
    h.committed_tx.send(commit(1, set(1, "/w/x", Cas::Missing))).unwrap();
    waiter.await.unwrap();

    let event = stream.recv().await.unwrap();
    assert_eq!(event.path, "/w/x");
    assert_eq!(event.rev, 1);
}

#[tokio::test]
async fn test_add_member_resolution_carries_ticket() {
    let h = harness_with(None);
    h.committed_tx.send(commit(1, set(1, "/a", Cas::Missing))).unwrap();

    let add = Proposal::new(tag(2), Op::AddMember(member(2)));
    let waiter = h.handle.register(tag(2));
    let snapshot = static_membership(&[1, 2], 4);
    h.committed_tx
        .send(Committed {
            revision: 2,
            proposal: add,
            membership: Some(snapshot.clone()),
        })
        .unwrap();

    let ticket = waiter.await.unwrap().ticket.expect("join ticket");
    assert_eq!(ticket.revision, 2);
    assert_eq!(ticket.membership, snapshot);
    assert_eq!(ticket.dedupe, vec![(1, tag(1)), (2, tag(2))]);
    assert!(ticket.entries.iter().any(|(path, _)| path == "/a"));

    // a joiner restored from the ticket continues at revision 3
    let joiner = harness_with(Some(*ticket));
    assert_eq!(joiner.handle.applied(), 2);
    assert_eq!(joiner.handle.store().read("/a").cas, Cas::Rev(1));
    let waiter = joiner.handle.register(tag(9));
    joiner.committed_tx.send(commit(3, set(9, "/b", Cas::Missing))).unwrap();
    assert_eq!(waiter.await.unwrap().revision, 3);
}

#[tokio::test]
async fn test_gap_in_revisions_is_fatal() {
    let h = harness_with(None);
    h.committed_tx.send(commit(2, set(1, "/a", Cas::Missing))).unwrap();
    let err = h.task.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::System(SystemError::Storage(StorageError::OutOfOrder { expected: 1, actual: 2 }))
    ));
}

#[tokio::test]
async fn test_wait_applied_blocks_until_revision() {
    let h = harness_with(None);
    let handle = h.handle.clone();
    let wait = tokio::spawn(async move { handle.wait_applied(2).await });
    h.committed_tx.send(commit(1, Proposal::nop())).unwrap();
    h.committed_tx.send(commit(2, Proposal::nop())).unwrap();
    assert_eq!(wait.await.unwrap().unwrap(), 2);
}
