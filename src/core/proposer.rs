//! Candidate and leader bookkeeping.
//!
//! These types hold no I/O: the consensus loop feeds them replies and
//! sends whatever they hand back.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use super::Proposal;
use super::Round;
use super::Tag;
use crate::ClusterMembership;
use crate::Configuration;

#[derive(Debug)]
struct PromiseReply {
    addr: SocketAddr,
    frontier: u64,
    accepted: Vec<(u64, Round, Proposal)>,
}

/// What a winning candidate must do before serving new proposals
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Recovery {
    /// Highest learned frontier among the promisers
    pub max_frontier: u64,
    /// Chosen slots the candidate has not learned, and who can serve them
    pub fetch: Option<(SocketAddr, u64, u64)>,
    /// Values to re-propose, Nop where nothing was reported
    pub slots: BTreeMap<u64, Proposal>,
}

#[derive(Debug)]
pub(crate) struct CandidateState {
    pub round: Round,
    pub from_slot: u64,
    promises: HashMap<u32, PromiseReply>,
    /// Unassigned proposals carried over from a previous leadership
    pub carry: VecDeque<Proposal>,
}

impl CandidateState {
    pub fn new(
        round: Round,
        from_slot: u64,
        carry: VecDeque<Proposal>,
    ) -> Self {
        Self {
            round,
            from_slot,
            promises: HashMap::new(),
            carry,
        }
    }

    pub fn record_promise(
        &mut self,
        from: u32,
        addr: SocketAddr,
        frontier: u64,
        accepted: Vec<(u64, Round, Proposal)>,
    ) {
        self.promises.insert(
            from,
            PromiseReply {
                addr,
                frontier,
                accepted,
            },
        );
    }

    pub fn promisers(&self) -> HashSet<u32> {
        self.promises.keys().copied().collect()
    }

    pub fn has_promised(
        &self,
        node_id: u32,
    ) -> bool {
        self.promises.contains_key(&node_id)
    }

    /// A quorum is needed in every configuration of the window
    pub fn has_quorum(
        &self,
        configs: &[Arc<Configuration>],
    ) -> bool {
        let promisers = self.promisers();
        !configs.is_empty() && configs.iter().all(|c| c.is_quorum(&promisers))
    }

    /// Merges the promises into the slots the new leader must settle.
    pub fn recovery(
        &self,
        own_frontier: u64,
    ) -> Recovery {
        let mut max_frontier = own_frontier;
        let mut fetch = None;
        for reply in self.promises.values() {
            if reply.frontier > max_frontier {
                max_frontier = reply.frontier;
                fetch = Some((reply.addr, own_frontier + 1, reply.frontier));
            }
        }

        // highest round wins per slot
        let mut highest: BTreeMap<u64, (Round, &Proposal)> = BTreeMap::new();
        for reply in self.promises.values() {
            for (slot, round, proposal) in &reply.accepted {
                if *slot <= max_frontier {
                    continue;
                }
                match highest.get(slot) {
                    Some((r, _)) if r >= round => {}
                    _ => {
                        highest.insert(*slot, (*round, proposal));
                    }
                }
            }
        }

        let mut slots = BTreeMap::new();
        if let Some(last) = highest.keys().next_back().copied() {
            for slot in (max_frontier + 1)..=last {
                let proposal = match highest.get(&slot) {
                    Some((_, p)) => (*p).clone(),
                    None => Proposal::nop(),
                };
                slots.insert(slot, proposal);
            }
        }

        Recovery {
            max_frontier,
            fetch,
            slots,
        }
    }
}

#[derive(Debug)]
struct Inflight {
    proposal: Proposal,
    acks: HashSet<u32>,
    last_sent: Instant,
}

/// Accepts to send: `(slot, proposal, targets)`
pub(crate) type Outgoing = Vec<(u64, Proposal, Vec<SocketAddr>)>;

#[derive(Debug, Default)]
pub(crate) struct Pumped {
    pub accepts: Outgoing,
    /// A slot's configuration lacks a promise quorum for this round
    pub needs_prepare: bool,
}

#[derive(Debug)]
pub(crate) struct LeaderState {
    pub round: Round,
    promisers: HashSet<u32>,
    next_slot: u64,
    inflight: BTreeMap<u64, Inflight>,
    backlog: BTreeMap<u64, Proposal>,
    queue: VecDeque<Proposal>,
    assigned: HashMap<Tag, u64>,
}

impl LeaderState {
    pub fn new(
        round: Round,
        promisers: HashSet<u32>,
        recovery: Recovery,
        carry: VecDeque<Proposal>,
    ) -> Self {
        let next_slot = recovery
            .slots
            .keys()
            .next_back()
            .copied()
            .unwrap_or(recovery.max_frontier)
            .max(recovery.max_frontier)
            + 1;

        let mut assigned = HashMap::new();
        for (slot, p) in &recovery.slots {
            if !p.tag.is_anonymous() {
                assigned.insert(p.tag, *slot);
            }
        }

        debug!(%round, next_slot, recovered = recovery.slots.len(), "leader state initialized");
        Self {
            round,
            promisers,
            next_slot,
            inflight: BTreeMap::new(),
            backlog: recovery.slots,
            queue: carry,
            assigned,
        }
    }

    pub fn next_slot(&self) -> u64 {
        self.next_slot
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// Whether a proposal with this tag already holds a slot
    pub fn is_assigned(
        &self,
        tag: &Tag,
    ) -> bool {
        self.assigned.contains_key(tag) || self.queue.iter().any(|p| p.tag == *tag)
    }

    /// Queues a new proposal; duplicates of assigned tags are dropped.
    pub fn enqueue(
        &mut self,
        proposal: Proposal,
    ) -> bool {
        if !proposal.tag.is_anonymous() && self.is_assigned(&proposal.tag) {
            trace!(tag = %proposal.tag, "proposal already assigned");
            return false;
        }
        self.queue.push_back(proposal);
        true
    }

    /// Assigns slots up to `frontier + alpha`.
    pub fn pump(
        &mut self,
        frontier: u64,
        membership: &ClusterMembership,
        now: Instant,
    ) -> Pumped {
        let limit = frontier + membership.alpha();
        let mut pumped = Pumped::default();

        while let Some((&slot, _)) = self.backlog.first_key_value() {
            if slot > limit {
                break;
            }
            let config = membership.config_for(slot);
            if !config.is_quorum(&self.promisers) {
                pumped.needs_prepare = true;
                return pumped;
            }
            if let Some(proposal) = self.backlog.remove(&slot) {
                pumped.accepts.push(self.start(slot, proposal, &config, now));
            }
        }

        while !self.queue.is_empty() && self.next_slot <= limit {
            let slot = self.next_slot;
            let config = membership.config_for(slot);
            if !config.is_quorum(&self.promisers) {
                pumped.needs_prepare = true;
                return pumped;
            }
            if let Some(proposal) = self.queue.pop_front() {
                if !proposal.tag.is_anonymous() {
                    self.assigned.insert(proposal.tag, slot);
                }
                self.next_slot += 1;
                pumped.accepts.push(self.start(slot, proposal, &config, now));
            }
        }

        pumped
    }

    fn start(
        &mut self,
        slot: u64,
        proposal: Proposal,
        config: &Configuration,
        now: Instant,
    ) -> (u64, Proposal, Vec<SocketAddr>) {
        self.inflight.insert(
            slot,
            Inflight {
                proposal: proposal.clone(),
                acks: HashSet::new(),
                last_sent: now,
            },
        );
        let targets = config.members().map(|m| m.peer_addr).collect();
        (slot, proposal, targets)
    }

    /// Records an Accepted; returns the proposal once a quorum of the
    /// slot's configuration has accepted it.
    pub fn on_accepted(
        &mut self,
        slot: u64,
        from: u32,
        membership: &ClusterMembership,
    ) -> Option<Proposal> {
        let inflight = self.inflight.get_mut(&slot)?;
        inflight.acks.insert(from);
        if !membership.config_for(slot).is_quorum(&inflight.acks) {
            return None;
        }
        let done = self.inflight.remove(&slot)?;
        self.assigned.remove(&done.proposal.tag);
        Some(done.proposal)
    }

    /// Forgets a slot learned through any path
    pub fn on_learned(
        &mut self,
        slot: u64,
    ) {
        if let Some(done) = self.inflight.remove(&slot) {
            self.assigned.remove(&done.proposal.tag);
        }
        self.backlog.remove(&slot);
    }

    /// Accepts unacknowledged for longer than `retry`, with the members still missing
    pub fn due_retransmits(
        &mut self,
        now: Instant,
        retry: Duration,
        membership: &ClusterMembership,
    ) -> Outgoing {
        let mut due = Vec::new();
        for (slot, inflight) in self.inflight.iter_mut() {
            if now.saturating_duration_since(inflight.last_sent) < retry {
                continue;
            }
            inflight.last_sent = now;
            let targets: Vec<SocketAddr> = membership
                .config_for(*slot)
                .members()
                .filter(|m| !inflight.acks.contains(&m.node_id))
                .map(|m| m.peer_addr)
                .collect();
            due.push((*slot, inflight.proposal.clone(), targets));
        }
        due
    }

    /// Proposals not yet bound to a slot, handed to the next leadership
    pub fn into_carry(self) -> VecDeque<Proposal> {
        self.queue
    }
}
