use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing_test::traced_test;

use super::Committed;
use super::Consensus;
use super::ConsensusChannels;
use super::ConsensusHandle;
use super::ConsensusStatus;
use super::Op;
use super::PeerMessage;
use super::Proposal;
use super::TagSource;
use crate::test_utils::fast_settings;
use crate::test_utils::member;
use crate::test_utils::next_committed;
use crate::test_utils::peer_addr;
use crate::test_utils::static_membership;
use crate::test_utils::MemNetwork;
use crate::test_utils::MemTypeConfig;
use crate::test_utils::MockTypeConfig;
use crate::Cas;
use crate::ClientError;
use crate::ClusterMembership;
use crate::Error;
use crate::MemAcceptorStorage;
use crate::MockTransport;
use crate::Settings;
use crate::Transport;

const WAIT: Duration = Duration::from_secs(10);

struct TestPeer {
    node_id: u32,
    handle: ConsensusHandle,
    committed_rx: mpsc::UnboundedReceiver<Committed>,
    membership: Arc<ClusterMembership>,
    _shutdown_tx: watch::Sender<()>,
}

fn spawn_peer_with(
    net: &MemNetwork,
    settings: Settings,
    membership: ClusterMembership,
    ready: bool,
) -> TestPeer {
    let node_id = settings.cluster.node_id;
    let settings = Arc::new(settings);
    let transport = Arc::new(net.transport(peer_addr(node_id)));

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (peer_tx, peer_rx) = mpsc::channel(4096);
    transport.listen(peer_tx, shutdown_rx.clone()).unwrap();
    let (event_tx, event_rx) = mpsc::channel(64);
    let (committed_tx, committed_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ConsensusStatus::default());

    let tags = TagSource::new(node_id);
    let membership = Arc::new(membership);
    let mut consensus = Consensus::<MemTypeConfig>::new(
        node_id,
        settings.clone(),
        transport,
        MemAcceptorStorage::new(),
        membership.clone(),
        ready,
        tags.clone(),
        ConsensusChannels {
            event_rx,
            peer_rx,
            committed_tx,
            status_tx,
            shutdown: shutdown_rx,
        },
    )
    .unwrap();
    tokio::spawn(async move { consensus.run().await });

    TestPeer {
        node_id,
        handle: ConsensusHandle::new(
            tags,
            event_tx,
            status_rx,
            Duration::from_millis(settings.consensus.propose_timeout_ms),
        ),
        committed_rx,
        membership,
        _shutdown_tx: shutdown_tx,
    }
}

fn spawn_cluster(
    net: &MemNetwork,
    ids: &[u32],
) -> Vec<TestPeer> {
    ids.iter()
        .map(|id| {
            let membership = ClusterMembership::empty(4);
            membership.restore(static_membership(ids, 4));
            spawn_peer_with(net, fast_settings(*id), membership, true)
        })
        .collect()
}

fn set_op(
    path: &str,
    body: &str,
) -> Op {
    Op::Set {
        path: path.into(),
        cas: Cas::Clobber,
        body: Bytes::from(body.to_string()),
    }
}

async fn propose(
    peer: &TestPeer,
    op: Op,
) -> crate::Result<u64> {
    let tag = peer.handle.next_tag();
    peer.handle.propose(Proposal::new(tag, op)).await
}

async fn wait_for_leader(peers: &[TestPeer]) -> usize {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some(i) = peers.iter().position(|p| p.handle.status().is_leader()) {
            return i;
        }
        assert!(tokio::time::Instant::now() < deadline, "no leader elected");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn ops(committed: &[Committed]) -> Vec<(u64, Op)> {
    committed
        .iter()
        .map(|c| (c.revision, c.proposal.op.clone()))
        .collect()
}

#[tokio::test]
#[traced_test]
async fn test_single_seed_elects_itself_and_orders_proposals() {
    let net = MemNetwork::new();
    let mut seed = spawn_peer_with(&net, fast_settings(1), ClusterMembership::bootstrap(member(1), 4), true);

    let status = tokio::time::timeout(WAIT, seed.handle.wait_for(|s| s.is_leader()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.leader_id, Some(1));

    for i in 1..=3u64 {
        let slot = propose(&seed, set_op("/a", &i.to_string())).await.unwrap();
        assert_eq!(slot, i);
    }

    let committed = next_committed(&mut seed.committed_rx, 3, WAIT).await;
    let revisions: Vec<u64> = committed.iter().map(|c| c.revision).collect();
    assert_eq!(revisions, vec![1, 2, 3]);
    assert_eq!(committed[2].proposal.op, set_op("/a", "3"));
    assert!(committed.iter().all(|c| c.membership.is_none()));
}

#[tokio::test]
#[traced_test]
async fn test_follower_proposals_are_forwarded_and_learned_everywhere() {
    let net = MemNetwork::new();
    let mut peers = spawn_cluster(&net, &[1, 2, 3]);
    let leader = wait_for_leader(&peers).await;
    let follower = (leader + 1) % peers.len();

    for i in 0..5 {
        propose(&peers[follower], set_op("/f", &i.to_string())).await.unwrap();
    }

    let mut logs = Vec::new();
    for peer in peers.iter_mut() {
        logs.push(ops(&next_committed(&mut peer.committed_rx, 5, WAIT).await));
    }
    assert_eq!(logs[0], logs[1]);
    assert_eq!(logs[1], logs[2]);
    assert_eq!(logs[0][4].1, set_op("/f", "4"));
}

/// # Case 1: an isolated leader is replaced
/// # Case 2: after healing it learns what it missed in the same order
#[tokio::test]
#[traced_test]
async fn test_leader_failover_and_catch_up() {
    let net = MemNetwork::new();
    let mut peers = spawn_cluster(&net, &[1, 2, 3]);
    let old = wait_for_leader(&peers).await;
    propose(&peers[old], set_op("/before", "x")).await.unwrap();

    net.isolate(peer_addr(peers[old].node_id));
    let survivor = (old + 1) % peers.len();
    for i in 0..3 {
        propose(&peers[survivor], set_op("/after", &i.to_string())).await.unwrap();
    }
    let status = peers[survivor].handle.status();
    assert_ne!(status.leader_id, Some(peers[old].node_id));

    let frontier = peers[survivor].handle.status().frontier;
    let expected = ops(&next_committed(&mut peers[survivor].committed_rx, frontier as usize, WAIT).await);

    net.heal(peer_addr(peers[old].node_id));
    let caught_up = ops(&next_committed(&mut peers[old].committed_rx, frontier as usize, WAIT).await);
    assert_eq!(caught_up, expected);
}

#[tokio::test]
#[traced_test]
async fn test_lossy_network_keeps_logs_identical() {
    let net = MemNetwork::new();
    net.set_drop_rate(0.2);
    let mut peers = spawn_cluster(&net, &[1, 2, 3]);
    wait_for_leader(&peers).await;

    for i in 0..10 {
        let peer = &peers[i % 3];
        propose(peer, set_op("/lossy", &i.to_string())).await.unwrap();
    }

    net.set_drop_rate(0.0);
    let target = peers.iter().map(|p| p.handle.status().frontier).max().unwrap_or(0) as usize;
    let mut logs = Vec::new();
    for peer in peers.iter_mut() {
        logs.push(ops(&next_committed(&mut peer.committed_rx, target, WAIT).await));
    }
    assert_eq!(logs[0], logs[1]);
    assert_eq!(logs[1], logs[2]);
    for i in 0..10 {
        assert!(logs[0].iter().any(|(_, op)| *op == set_op("/lossy", &i.to_string())));
    }
}

#[tokio::test]
#[traced_test]
async fn test_joiner_restores_and_takes_part() {
    let net = MemNetwork::new();
    let mut seed = spawn_peer_with(&net, fast_settings(1), ClusterMembership::bootstrap(member(1), 4), true);
    seed.handle.wait_for(|s| s.is_leader()).await.unwrap();
    let mut joiner = spawn_peer_with(&net, fast_settings(2), ClusterMembership::empty(4), false);
    assert!(!joiner.handle.status().ready);

    let slot = propose(&seed, Op::AddMember(member(2))).await.unwrap();
    let committed = next_committed(&mut seed.committed_rx, 1, WAIT).await;
    let snapshot = committed[0].membership.clone().expect("membership snapshot on AddMember");
    assert_eq!(slot, 1);

    joiner.handle.restore(slot, snapshot).await.unwrap();
    assert!(joiner.membership.latest().contains(2));

    // slots past alpha need both members
    for i in 0..8 {
        propose(&seed, set_op("/j", &i.to_string())).await.unwrap();
    }
    let from_joiner = propose(&joiner, set_op("/j", "joiner")).await.unwrap();
    assert!(from_joiner > 8);

    let seed_log = ops(&next_committed(&mut seed.committed_rx, from_joiner as usize - 1, WAIT).await);
    let joiner_log = ops(&next_committed(&mut joiner.committed_rx, from_joiner as usize - 1, WAIT).await);
    assert_eq!(joiner_log, seed_log);
    assert_eq!(joiner_log[0].0, 2);
    assert!(joiner.handle.status().ready);
}

#[tokio::test]
#[traced_test]
async fn test_removed_member_leaves_configuration() {
    let net = MemNetwork::new();
    let mut peers = spawn_cluster(&net, &[1, 2, 3]);
    let leader = wait_for_leader(&peers).await;
    let victim = if peers[leader].node_id == 3 { 2 } else { 3 };

    propose(&peers[leader], Op::RemoveMember { node_id: victim }).await.unwrap();
    let committed = next_committed(&mut peers[leader].committed_rx, 1, WAIT).await;
    assert!(committed[0].membership.is_some());
    assert!(!peers[leader].membership.latest().contains(victim));

    // the remaining pair commits without the removed member
    net.isolate(peer_addr(victim));
    for i in 0..6 {
        propose(&peers[leader], set_op("/r", &i.to_string())).await.unwrap();
    }
}

#[tokio::test]
#[traced_test]
async fn test_proposal_without_quorum_is_unavailable() {
    let net = MemNetwork::new();
    let mut settings = fast_settings(1);
    settings.consensus.propose_timeout_ms = 300;
    let membership = ClusterMembership::empty(4);
    membership.restore(static_membership(&[1, 2, 3], 4));
    let lonely = spawn_peer_with(&net, settings, membership, true);

    let err = propose(&lonely, set_op("/x", "y")).await.unwrap_err();
    assert!(matches!(err, Error::Client(ClientError::Unavailable(_))));
}

#[tokio::test]
async fn test_election_timeout_sends_prepare_to_every_other_member() {
    let settings = Arc::new(fast_settings(1));
    let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();

    let mut transport = MockTransport::new();
    transport.expect_local_addr().return_const(peer_addr(1));
    transport.expect_send().returning(move |target, envelope| {
        let _ = sent_tx.send((target, envelope.message.clone()));
        Ok(())
    });

    let membership = ClusterMembership::empty(4);
    membership.restore(static_membership(&[1, 2, 3], 4));
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let (_peer_tx, peer_rx) = mpsc::channel(16);
    let (_event_tx, event_rx) = mpsc::channel(16);
    let (committed_tx, _committed_rx) = mpsc::unbounded_channel();
    let (status_tx, _status_rx) = watch::channel(ConsensusStatus::default());
    let mut consensus = Consensus::<MockTypeConfig>::new(
        1,
        settings,
        Arc::new(transport),
        MemAcceptorStorage::new(),
        Arc::new(membership),
        true,
        TagSource::new(1),
        ConsensusChannels {
            event_rx,
            peer_rx,
            committed_tx,
            status_tx,
            shutdown: shutdown_rx,
        },
    )
    .unwrap();
    tokio::spawn(async move { consensus.run().await });

    let mut prepared = Vec::new();
    while prepared.len() < 2 {
        let (target, message) = tokio::time::timeout(WAIT, sent_rx.recv()).await.unwrap().unwrap();
        if let PeerMessage::Prepare { round, .. } = message {
            assert_eq!(round.node_id, 1);
            if !prepared.contains(&target) {
                prepared.push(target);
            }
        }
    }
    prepared.sort();
    assert_eq!(prepared, vec![peer_addr(2), peer_addr(3)]);
}

/// An Accept that cannot fit one datagram is refused up front; the log keeps moving
#[tokio::test]
#[traced_test]
async fn test_oversized_proposal_is_refused_without_wedging_the_log() {
    let net = MemNetwork::new();
    net.set_max_datagram_size(2048);
    let ids = [1, 2, 3];
    let mut peers: Vec<TestPeer> = ids
        .iter()
        .map(|id| {
            let mut settings = fast_settings(*id);
            settings.network.max_datagram_size = 2048;
            let membership = ClusterMembership::empty(4);
            membership.restore(static_membership(&ids, 4));
            spawn_peer_with(&net, settings, membership, true)
        })
        .collect();
    let leader = wait_for_leader(&peers).await;
    let follower = (leader + 1) % peers.len();

    let long_path = format!("/{}", "p".repeat(4096));
    for i in [leader, follower] {
        let err = propose(&peers[i], set_op(&long_path, "v")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Client(ClientError::PayloadTooLarge { max: 2048, .. })
        ));
    }

    let slot = propose(&peers[follower], set_op("/after", "ok")).await.unwrap();
    for peer in peers.iter_mut() {
        let log = ops(&next_committed(&mut peer.committed_rx, slot as usize, WAIT).await);
        assert_eq!(log.last(), Some(&(slot, set_op("/after", "ok"))));
        assert!(log.iter().all(|(_, op)| *op != set_op(&long_path, "v")));
    }
}
