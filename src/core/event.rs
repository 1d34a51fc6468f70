use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;

use super::Proposal;
use super::Round;
use crate::MembershipSnapshot;
use crate::Result;

/// Messages exchanged between consensus peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Phase 1a: claim every slot `>= from_slot` for `round`
    Prepare { round: Round, from_slot: u64 },
    /// Phase 1b: accepted values above the promiser's learned `frontier`
    Promise {
        round: Round,
        from_slot: u64,
        frontier: u64,
        accepted: Vec<(u64, Round, Proposal)>,
    },
    /// Phase 2a
    Accept { round: Round, slot: u64, proposal: Proposal },
    /// Phase 2b
    Accepted { round: Round, slot: u64 },
    /// `round` was refused because the acceptor promised `promised`,
    /// or the request reached below its retention `low_water` mark
    Nack { round: Round, promised: Round, low_water: u64 },
    /// Slot value is chosen
    Learn { slot: u64, proposal: Proposal },
    /// Leader liveness plus its learned frontier
    Heartbeat { round: Round, frontier: u64 },
    /// Request for learned slots in `[from_slot, to_slot]`
    Fetch { from_slot: u64, to_slot: u64 },
    /// Proposal routed to the leader
    Forward { proposal: Proposal },
}

/// A peer message with its sender identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: u32,
    /// Where replies to this message go
    pub from_addr: SocketAddr,
    pub message: PeerMessage,
}

impl Envelope {
    /// Size of the bincode encoding the transports put on the wire
    pub fn encoded_len(&self) -> usize {
        bincode::serialized_size(self).map_or(usize::MAX, |n| n as usize)
    }
}

/// Local requests into the consensus task
#[derive(Debug)]
pub enum ConsensusEvent {
    /// Order `proposal`; resolves with its slot once learned
    Propose {
        proposal: Proposal,
        resp: oneshot::Sender<Result<u64>>,
    },
    /// Install a join ticket: learning continues at `revision + 1`
    Restore {
        revision: u64,
        membership: MembershipSnapshot,
        resp: oneshot::Sender<()>,
    },
}

/// A learned log entry handed to the dispatcher, strictly in slot order
#[derive(Debug, Clone)]
pub struct Committed {
    pub revision: u64,
    pub proposal: Proposal,
    /// Membership right after this entry, for entries that changed it
    pub membership: Option<MembershipSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoleKind {
    #[default]
    Follower,
    Candidate,
    Leader,
}

/// Observable state of the local consensus task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsensusStatus {
    pub role: RoleKind,
    pub leader_id: Option<u32>,
    pub round: Round,
    /// Highest slot such that every slot up to it is learned
    pub frontier: u64,
    /// Whether the node holds a complete log prefix (seed, or joined and restored)
    pub ready: bool,
}

impl ConsensusStatus {
    pub fn is_leader(&self) -> bool {
        self.role == RoleKind::Leader
    }
}
