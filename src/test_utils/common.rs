use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::Committed;
use crate::Configuration;
use crate::Member;
use crate::MembershipSnapshot;
use crate::Settings;

pub fn peer_addr(node_id: u32) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 17_000 + node_id as u16))
}

pub fn client_addr(node_id: u32) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 18_000 + node_id as u16))
}

pub fn member(node_id: u32) -> Member {
    Member {
        node_id,
        peer_addr: peer_addr(node_id),
        client_addr: client_addr(node_id),
    }
}

/// Membership where `ids` govern every slot from 1
pub fn static_membership(
    ids: &[u32],
    alpha: u64,
) -> MembershipSnapshot {
    MembershipSnapshot {
        alpha,
        history: vec![(1, Configuration::new(ids.iter().map(|id| member(*id))))],
    }
}

/// Settings with timers short enough for tests
pub fn fast_settings(node_id: u32) -> Settings {
    let mut settings = Settings::default();
    settings.cluster.node_id = node_id;
    settings.cluster.peer_address = peer_addr(node_id);
    settings.cluster.client_address = client_addr(node_id);
    settings.cluster.db_root_dir = None;

    let consensus = &mut settings.consensus;
    consensus.alpha = 4;
    consensus.tick_interval_ms = 5;
    consensus.heartbeat_interval_ms = 20;
    consensus.election_timeout_min_ms = 100;
    consensus.election_timeout_max_ms = 200;
    consensus.accept_retry_ms = 40;
    consensus.fill_timeout_ms = 40;
    consensus.forward_retry_ms = 60;
    consensus.propose_timeout_ms = 5000;
    consensus.max_propose_attempts = 100;
    settings
}

/// Receives the next `n` committed entries, failing after `within`
pub async fn next_committed(
    rx: &mut mpsc::UnboundedReceiver<Committed>,
    n: usize,
    within: Duration,
) -> Vec<Committed> {
    let mut out = Vec::with_capacity(n);
    let deadline = tokio::time::Instant::now() + within;
    while out.len() < n {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(c)) => out.push(c),
            Ok(None) => panic!("committed channel closed after {} entries", out.len()),
            Err(_) => panic!("timed out after {} of {n} committed entries", out.len()),
        }
    }
    out
}
