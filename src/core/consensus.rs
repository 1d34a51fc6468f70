//! The consensus task.
//!
//! One task per node owns the acceptor, the learner and, while it leads,
//! the proposer state. Everything reaches it as a message: peer envelopes,
//! local proposals and a periodic tick. Learned entries leave it in slot
//! order on the committed channel.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::net::Ipv6Addr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::acceptor::Acceptor;
use super::learner::Learner;
use super::proposer::CandidateState;
use super::proposer::LeaderState;
use super::Committed;
use super::ConsensusEvent;
use super::ConsensusStatus;
use super::ElectionTimer;
use super::Envelope;
use super::IntervalTimer;
use super::PeerMessage;
use super::Proposal;
use super::RoleKind;
use super::Round;
use super::Tag;
use super::TagSource;
use crate::alias::SOF;
use crate::alias::TROF;
use crate::ClientError;
use crate::ClusterMembership;
use crate::HealthChecker;
use crate::Op;
use crate::Result;
use crate::Settings;
use crate::Transport;
use crate::TypeConfig;

#[derive(Debug)]
enum Role {
    Follower { leader: Option<(u32, SocketAddr)> },
    Candidate(CandidateState),
    Leader(LeaderState),
}

impl Role {
    fn kind(&self) -> RoleKind {
        match self {
            Role::Follower { .. } => RoleKind::Follower,
            Role::Candidate(_) => RoleKind::Candidate,
            Role::Leader(_) => RoleKind::Leader,
        }
    }
}

#[derive(Debug)]
struct PendingProposal {
    proposal: Proposal,
    resp: oneshot::Sender<Result<u64>>,
    attempts: u32,
    deadline: Instant,
    last_sent: Option<Instant>,
}

/// Channels wiring the consensus task to the rest of the node
pub(crate) struct ConsensusChannels {
    pub event_rx: mpsc::Receiver<ConsensusEvent>,
    pub peer_rx: mpsc::Receiver<Envelope>,
    pub committed_tx: mpsc::UnboundedSender<Committed>,
    pub status_tx: watch::Sender<ConsensusStatus>,
    pub shutdown: watch::Receiver<()>,
}

pub struct Consensus<T>
where T: TypeConfig
{
    node_id: u32,
    peer_addr: SocketAddr,
    settings: Arc<Settings>,
    transport: Arc<TROF<T>>,

    acceptor: Acceptor<SOF<T>>,
    learner: Learner,
    membership: Arc<ClusterMembership>,

    role: Role,
    /// Highest round observed from any peer
    max_seen: Round,

    election_timer: ElectionTimer,
    heartbeat_timer: IntervalTimer,
    retransmit_timer: IntervalTimer,
    health: HealthChecker,

    pending: HashMap<Tag, PendingProposal>,
    /// Messages addressed to this node itself
    inbox: VecDeque<Envelope>,
    tags: TagSource,

    event_rx: mpsc::Receiver<ConsensusEvent>,
    peer_rx: mpsc::Receiver<Envelope>,
    committed_tx: mpsc::UnboundedSender<Committed>,
    status_tx: watch::Sender<ConsensusStatus>,
    shutdown_signal: watch::Receiver<()>,
}

impl<T> Consensus<T>
where T: TypeConfig
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node_id: u32,
        settings: Arc<Settings>,
        transport: Arc<TROF<T>>,
        storage: SOF<T>,
        membership: Arc<ClusterMembership>,
        ready: bool,
        tags: TagSource,
        channels: ConsensusChannels,
    ) -> Result<Self> {
        let acceptor = Acceptor::new(storage)?;
        let consensus = &settings.consensus;
        let learner = Learner::new(ready, consensus.log_retention);
        let mut election_timer = ElectionTimer::new(consensus.election_timeout_range());
        let latest = membership.latest();
        if ready && latest.len() == 1 && latest.contains(node_id) {
            // a lone member has nobody to wait for
            election_timer.expire_now();
        }

        Ok(Self {
            node_id,
            peer_addr: transport.local_addr(),
            heartbeat_timer: IntervalTimer::new(consensus.heartbeat_interval_ms),
            retransmit_timer: IntervalTimer::new(consensus.accept_retry_ms),
            health: HealthChecker::new(Duration::from_millis(consensus.member_timeout_ms)),
            max_seen: acceptor.promised(),
            settings,
            transport,
            acceptor,
            learner,
            membership,
            role: Role::Follower { leader: None },
            election_timer,
            pending: HashMap::new(),
            inbox: VecDeque::new(),
            tags,
            event_rx: channels.event_rx,
            peer_rx: channels.peer_rx,
            committed_tx: channels.committed_tx,
            status_tx: channels.status_tx,
            shutdown_signal: channels.shutdown,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut tick = tokio::time::interval(self.settings.consensus.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(node_id = self.node_id, peer_addr = %self.peer_addr, "consensus started");

        loop {
            tokio::select! {
                // Use biased to ensure branch order
                biased;
                // P0: shutdown received;
                _ = self.shutdown_signal.changed() => {
                    warn!(node_id = self.node_id, "shutdown signal received");
                    self.before_shutdown();
                    return Ok(());
                }
                // P1: timers
                _ = tick.tick() => {
                    self.on_tick(Instant::now())?;
                }
                // P2: local requests
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event)?;
                }
                // P3: peer messages
                Some(envelope) = self.peer_rx.recv() => {
                    self.handle_envelope(envelope)?;
                }
            }

            self.settle()?;
            self.publish_status();
        }
    }

    /// Handles self-addressed messages and pumps until neither produces more work
    fn settle(&mut self) -> Result<()> {
        loop {
            while let Some(envelope) = self.inbox.pop_front() {
                self.handle_envelope(envelope)?;
            }
            self.pump(Instant::now());
            if self.inbox.is_empty() {
                return Ok(());
            }
        }
    }

    fn handle_event(
        &mut self,
        event: ConsensusEvent,
    ) -> Result<()> {
        match event {
            ConsensusEvent::Propose { proposal, resp } => {
                let tag = proposal.tag;
                if let Err(e) = self.check_encodable(&proposal) {
                    debug!(%tag, error = %e, "proposal refused");
                    let _ = resp.send(Err(e.into()));
                    return Ok(());
                }
                let consensus = &self.settings.consensus;
                trace!(%tag, "proposal submitted");
                self.pending.insert(
                    tag,
                    PendingProposal {
                        proposal,
                        resp,
                        attempts: 0,
                        deadline: Instant::now() + Duration::from_millis(consensus.propose_timeout_ms),
                        last_sent: None,
                    },
                );
                self.route(tag, Instant::now());
            }
            ConsensusEvent::Restore {
                revision,
                membership,
                resp,
            } => {
                info!(revision, "installing join ticket");
                self.membership.restore(membership);
                let released = self.learner.restore(revision);
                self.deliver(released)?;
                let _ = resp.send(());
            }
        }
        Ok(())
    }

    fn handle_envelope(
        &mut self,
        envelope: Envelope,
    ) -> Result<()> {
        let Envelope {
            from,
            from_addr,
            message,
        } = envelope;
        self.health.observe(from, Instant::now());

        match message {
            PeerMessage::Prepare { round, from_slot } => {
                self.observe_round(round);
                let reply = self.acceptor.handle_prepare(round, from_slot, self.learner.frontier())?;
                if matches!(reply, PeerMessage::Promise { .. }) && round > self.own_round() {
                    self.step_down(None);
                }
                self.send(from_addr, reply);
            }
            PeerMessage::Promise {
                round,
                frontier,
                accepted,
                ..
            } => {
                let won = match &mut self.role {
                    Role::Candidate(c) if c.round == round => {
                        c.record_promise(from, from_addr, frontier, accepted);
                        let configs = self
                            .membership
                            .configs_in(c.from_slot, self.learner.frontier() + self.membership.alpha());
                        c.has_quorum(&configs)
                    }
                    _ => false,
                };
                if won {
                    self.become_leader();
                }
            }
            PeerMessage::Accept { round, slot, proposal } => {
                self.observe_round(round);
                let reply = self.acceptor.handle_accept(round, slot, proposal)?;
                if matches!(reply, PeerMessage::Accepted { .. }) && from != self.node_id {
                    self.follow(from, from_addr, round);
                }
                self.send(from_addr, reply);
            }
            PeerMessage::Accepted { round, slot } => {
                let chosen = match &mut self.role {
                    Role::Leader(l) if l.round == round => l.on_accepted(slot, from, &self.membership),
                    _ => None,
                };
                if let Some(proposal) = chosen {
                    self.choose(slot, proposal)?;
                }
            }
            PeerMessage::Nack {
                round,
                promised,
                low_water,
            } => {
                self.observe_round(promised);
                let preempted = round == self.own_round() && promised > round;
                let behind = matches!(self.role, Role::Candidate(_)) && low_water > self.learner.frontier() + 1;
                if preempted {
                    debug!(from, %round, %promised, "preempted");
                    self.step_down(None);
                } else if behind {
                    warn!(from, low_water, frontier = self.learner.frontier(), "peer pruned past our frontier");
                    self.step_down(None);
                }
            }
            PeerMessage::Heartbeat { round, frontier } => {
                if round < self.acceptor.promised() {
                    trace!(from, %round, "stale heartbeat");
                    self.send(
                        from_addr,
                        PeerMessage::Nack {
                            round,
                            promised: self.acceptor.promised(),
                            low_water: self.acceptor.low_water(),
                        },
                    );
                    return Ok(());
                }
                self.observe_round(round);
                self.follow(from, from_addr, round);
                self.learner.note_frontier(frontier);
            }
            PeerMessage::Learn { slot, proposal } => {
                let released = self.learner.learn(slot, proposal);
                self.deliver(released)?;
            }
            PeerMessage::Fetch { from_slot, to_slot } => {
                let retained = self.learner.retained(from_slot, to_slot);
                if retained.is_empty() && from_slot <= self.learner.frontier() {
                    warn!(from, from_slot, "requested slots already pruned");
                }
                for (slot, proposal) in retained {
                    self.send(from_addr, PeerMessage::Learn { slot, proposal });
                }
            }
            PeerMessage::Forward { proposal } => {
                if let Err(e) = self.check_encodable(&proposal) {
                    warn!(from, tag = %proposal.tag, error = %e, "forward dropped, accept would not fit a datagram");
                    return Ok(());
                }
                match &mut self.role {
                    Role::Leader(l) => {
                        l.enqueue(proposal);
                    }
                    _ => trace!(from, tag = %proposal.tag, "forward dropped, not leader"),
                }
            }
        }
        Ok(())
    }

    fn on_tick(
        &mut self,
        now: Instant,
    ) -> Result<()> {
        match self.role.kind() {
            RoleKind::Follower => {
                if self.can_campaign() && self.election_timer.is_expired() {
                    self.start_election();
                }
            }
            RoleKind::Candidate => {
                if self.election_timer.is_expired() {
                    debug!(node_id = self.node_id, "election timed out, retrying");
                    self.start_election();
                } else if self.retransmit_timer.fire(now) {
                    self.resend_prepare();
                }
            }
            RoleKind::Leader => {
                if self.heartbeat_timer.fire(now) {
                    self.send_heartbeats();
                }
                if self.retransmit_timer.fire(now) {
                    self.resend_accepts(now);
                }
                self.check_health(now);
            }
        }

        if let Some((from_slot, to_slot)) = self
            .learner
            .poll_gap(now, Duration::from_millis(self.settings.consensus.fill_timeout_ms))
        {
            if let Some(target) = self.fetch_target() {
                debug!(from_slot, to_slot, %target, "fetching missing slots");
                self.send(target, PeerMessage::Fetch { from_slot, to_slot });
            }
        }

        self.tick_pending(now);

        if let Some(floor) = self.learner.prune() {
            self.acceptor.prune_below(floor)?;
            self.membership.prune_below(floor);
        }
        Ok(())
    }

    /// Campaigning needs a complete log prefix and a seat in the latest configuration
    fn can_campaign(&self) -> bool {
        self.learner.is_ready() && self.membership.latest().contains(self.node_id)
    }

    fn own_round(&self) -> Round {
        match &self.role {
            Role::Follower { .. } => Round::ZERO,
            Role::Candidate(c) => c.round,
            Role::Leader(l) => l.round,
        }
    }

    fn observe_round(
        &mut self,
        round: Round,
    ) {
        if round > self.max_seen {
            self.max_seen = round;
        }
    }

    /// Accepts `from` as leader if its round is current
    fn follow(
        &mut self,
        from: u32,
        from_addr: SocketAddr,
        round: Round,
    ) {
        let own = self.own_round();
        if let Role::Follower { leader } = &mut self.role {
            if leader.map(|(id, _)| id) != Some(from) {
                info!(leader_id = from, %round, "following new leader");
            }
            *leader = Some((from, from_addr));
            self.election_timer.reset();
            return;
        }
        if round > own {
            self.step_down(Some((from, from_addr)));
        }
    }

    fn step_down(
        &mut self,
        leader: Option<(u32, SocketAddr)>,
    ) {
        if !matches!(self.role, Role::Follower { .. }) {
            info!(node_id = self.node_id, role = ?self.role.kind(), "stepping down");
        }
        self.role = Role::Follower { leader };
        self.election_timer.reset();
    }

    /// Phase 1 for every slot after the local frontier.
    ///
    /// Also used by a leader to re-establish itself under a new configuration;
    /// unassigned proposals carry over.
    fn start_election(&mut self) {
        let carry = match std::mem::replace(&mut self.role, Role::Follower { leader: None }) {
            Role::Leader(l) => l.into_carry(),
            Role::Candidate(c) => c.carry,
            Role::Follower { .. } => VecDeque::new(),
        };

        let round = self.max_seen.max(self.acceptor.promised()).next_for(self.node_id);
        self.max_seen = round;
        let from_slot = self.learner.frontier() + 1;
        info!(node_id = self.node_id, %round, from_slot, "starting election");

        self.role = Role::Candidate(CandidateState::new(round, from_slot, carry));
        self.election_timer.reset();
        self.resend_prepare();
    }

    fn resend_prepare(&mut self) {
        let (round, from_slot, targets) = match &self.role {
            Role::Candidate(c) => {
                let targets: Vec<u32> = self
                    .membership
                    .ids_from(c.from_slot)
                    .into_iter()
                    .filter(|id| !c.has_promised(*id))
                    .collect();
                (c.round, c.from_slot, targets)
            }
            _ => return,
        };
        for addr in self.addrs_of(targets) {
            self.send(addr, PeerMessage::Prepare { round, from_slot });
        }
    }

    fn become_leader(&mut self) {
        let candidate = match std::mem::replace(&mut self.role, Role::Follower { leader: None }) {
            Role::Candidate(c) => c,
            other => {
                self.role = other;
                return;
            }
        };

        let recovery = candidate.recovery(self.learner.frontier());
        if let Some((addr, from_slot, to_slot)) = recovery.fetch {
            self.learner.note_frontier(recovery.max_frontier);
            self.send(addr, PeerMessage::Fetch { from_slot, to_slot });
        }

        let mut leader = LeaderState::new(candidate.round, candidate.promisers(), recovery, candidate.carry);
        for pending in self.pending.values_mut() {
            if leader.enqueue(pending.proposal.clone()) {
                pending.attempts += 1;
            }
        }
        info!(node_id = self.node_id, round = %leader.round, next_slot = leader.next_slot(), "became leader");

        self.health.reset(&self.membership.latest(), Instant::now());
        self.role = Role::Leader(leader);
        self.send_heartbeats();
    }

    /// Phase 2 for whatever the leader may assign now
    fn pump(
        &mut self,
        now: Instant,
    ) {
        let round;
        let pumped = match &mut self.role {
            Role::Leader(l) => {
                round = l.round;
                l.pump(self.learner.frontier(), &self.membership, now)
            }
            _ => return,
        };

        for (slot, proposal, targets) in pumped.accepts {
            trace!(slot, tag = %proposal.tag, "accept");
            for addr in targets {
                self.send(
                    addr,
                    PeerMessage::Accept {
                        round,
                        slot,
                        proposal: proposal.clone(),
                    },
                );
            }
        }

        if pumped.needs_prepare {
            info!(node_id = self.node_id, "configuration changed under round, re-preparing");
            self.start_election();
        }
    }

    fn resend_accepts(
        &mut self,
        now: Instant,
    ) {
        let retry = Duration::from_millis(self.settings.consensus.accept_retry_ms);
        let (round, due) = match &mut self.role {
            Role::Leader(l) => (l.round, l.due_retransmits(now, retry, &self.membership)),
            _ => return,
        };
        for (slot, proposal, targets) in due {
            for addr in targets {
                self.send(
                    addr,
                    PeerMessage::Accept {
                        round,
                        slot,
                        proposal: proposal.clone(),
                    },
                );
            }
        }
    }

    fn send_heartbeats(&mut self) {
        let round = self.own_round();
        let frontier = self.learner.frontier();
        let targets: Vec<u32> = self
            .membership
            .ids_from(frontier + 1)
            .into_iter()
            .filter(|id| *id != self.node_id)
            .collect();
        for addr in self.addrs_of(targets) {
            self.send(addr, PeerMessage::Heartbeat { round, frontier });
        }
    }

    fn check_health(
        &mut self,
        now: Instant,
    ) {
        let latest = self.membership.latest();
        let silent = self.health.newly_silent(&latest, self.node_id, now);
        for node_id in silent {
            warn!(node_id, "member unresponsive");
            if !self.settings.consensus.auto_evict {
                continue;
            }
            let tag = self.tags.next();
            if let Role::Leader(l) = &mut self.role {
                info!(node_id, %tag, "evicting unresponsive member");
                l.enqueue(Proposal::new(tag, Op::RemoveMember { node_id }));
            }
        }
    }

    /// A quorum accepted `slot`: tell everyone and learn it here
    fn choose(
        &mut self,
        slot: u64,
        proposal: Proposal,
    ) -> Result<()> {
        trace!(slot, tag = %proposal.tag, "chosen");
        let mut ids: BTreeSet<u32> = self.membership.ids_from(slot);
        ids.extend(self.membership.latest().ids());
        ids.remove(&self.node_id);
        for addr in self.addrs_of(ids) {
            self.send(
                addr,
                PeerMessage::Learn {
                    slot,
                    proposal: proposal.clone(),
                },
            );
        }
        let released = self.learner.learn(slot, proposal);
        self.deliver(released)
    }

    /// Hands contiguous learned entries to the dispatcher
    fn deliver(
        &mut self,
        released: Vec<(u64, Proposal)>,
    ) -> Result<()> {
        let mut membership_changed = false;
        for (slot, proposal) in released {
            let mut membership = None;
            if proposal.op.is_membership_change() {
                match self.membership.apply(slot, &proposal.op) {
                    Ok(true) => {
                        membership_changed = true;
                        membership = Some(self.membership.snapshot());
                    }
                    // an unchanged re-admission still hands the joiner a ticket
                    Ok(false) if matches!(proposal.op, Op::AddMember(_)) => {
                        membership = Some(self.membership.snapshot());
                    }
                    Ok(false) => {}
                    Err(e) => debug!(slot, error = %e, "membership change rejected"),
                }
            }

            if let Role::Leader(l) = &mut self.role {
                l.on_learned(slot);
            }
            if let Some(pending) = self.pending.remove(&proposal.tag) {
                let _ = pending.resp.send(Ok(slot));
            }

            let committed = Committed {
                revision: slot,
                proposal,
                membership,
            };
            if self.committed_tx.send(committed).is_err() {
                error!(slot, "dispatcher gone, committed entry dropped");
            }
        }

        if membership_changed && matches!(self.role, Role::Leader(_)) {
            // promises must cover the new configuration before it governs a slot
            self.start_election();
        }
        Ok(())
    }

    /// Routes a pending proposal toward the leader
    fn route(
        &mut self,
        tag: Tag,
        now: Instant,
    ) {
        let Some(pending) = self.pending.get_mut(&tag) else {
            return;
        };
        match &mut self.role {
            Role::Leader(l) => {
                if l.enqueue(pending.proposal.clone()) {
                    pending.attempts += 1;
                }
                pending.last_sent = Some(now);
            }
            Role::Follower {
                leader: Some((leader_id, addr)),
            } if *leader_id != self.node_id => {
                let addr = *addr;
                pending.attempts += 1;
                pending.last_sent = Some(now);
                let message = PeerMessage::Forward {
                    proposal: pending.proposal.clone(),
                };
                self.send(addr, message);
            }
            _ => trace!(%tag, "no leader known, holding proposal"),
        }
    }

    fn tick_pending(
        &mut self,
        now: Instant,
    ) {
        let consensus = &self.settings.consensus;
        let retry = Duration::from_millis(consensus.forward_retry_ms);
        let max_attempts = consensus.max_propose_attempts;

        let mut expired = Vec::new();
        let mut due = Vec::new();
        for (tag, pending) in &self.pending {
            if now >= pending.deadline || pending.attempts >= max_attempts {
                expired.push(*tag);
            } else if pending
                .last_sent
                .map_or(true, |sent| now.saturating_duration_since(sent) >= retry)
            {
                due.push(*tag);
            }
        }

        for tag in expired {
            if let Some(pending) = self.pending.remove(&tag) {
                debug!(%tag, attempts = pending.attempts, "proposal expired");
                let _ = pending
                    .resp
                    .send(Err(ClientError::Unavailable(format!("no quorum ordered proposal {tag}")).into()));
            }
        }
        for tag in due {
            self.route(tag, now);
        }
    }

    fn fetch_target(&self) -> Option<SocketAddr> {
        if let Role::Follower {
            leader: Some((id, addr)),
        } = &self.role
        {
            if *id != self.node_id {
                return Some(*addr);
            }
        }
        let others: Vec<SocketAddr> = self
            .membership
            .latest()
            .members()
            .filter(|m| m.node_id != self.node_id)
            .map(|m| m.peer_addr)
            .collect();
        others.choose(&mut rand::thread_rng()).copied()
    }

    fn addrs_of(
        &self,
        ids: impl IntoIterator<Item = u32>,
    ) -> Vec<SocketAddr> {
        ids.into_iter()
            .filter_map(|id| {
                if id == self.node_id {
                    return Some(self.peer_addr);
                }
                self.membership.member(id).map(|m| m.peer_addr)
            })
            .collect()
    }

    /// Refuses a proposal whose Accept could never reach a peer.
    ///
    /// Such a slot would be retransmitted forever and freeze the frontier.
    fn check_encodable(
        &self,
        proposal: &Proposal,
    ) -> std::result::Result<(), ClientError> {
        let max = self.settings.network.max_datagram_size;
        let accept = Envelope {
            from: self.node_id,
            // widest address encoding
            from_addr: SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
            message: PeerMessage::Accept {
                round: self.max_seen,
                slot: u64::MAX,
                proposal: proposal.clone(),
            },
        };
        let size = accept.encoded_len();
        if size > max {
            return Err(ClientError::PayloadTooLarge { size, max });
        }
        Ok(())
    }

    fn send(
        &mut self,
        target: SocketAddr,
        message: PeerMessage,
    ) {
        let envelope = Envelope {
            from: self.node_id,
            from_addr: self.peer_addr,
            message,
        };
        if target == self.peer_addr {
            self.inbox.push_back(envelope);
            return;
        }
        if let Err(e) = self.transport.send(target, &envelope) {
            debug!(%target, error = %e, "send failed");
        }
    }

    fn publish_status(&self) {
        let leader_id = match &self.role {
            Role::Leader(_) => Some(self.node_id),
            Role::Follower { leader } => leader.map(|(id, _)| id),
            Role::Candidate(_) => None,
        };
        let status = ConsensusStatus {
            role: self.role.kind(),
            leader_id,
            round: self.own_round().max(self.max_seen),
            frontier: self.learner.frontier(),
            ready: self.learner.is_ready(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn before_shutdown(&mut self) {
        if let Err(e) = self.acceptor.flush() {
            error!("Flush acceptor state failed: {:?}", e);
        }
        for (tag, pending) in self.pending.drain() {
            trace!(%tag, "failing pending proposal on shutdown");
            let _ = pending
                .resp
                .send(Err(ClientError::Unavailable("node shutting down".into()).into()));
        }
        info!(node_id = self.node_id, "consensus stopped");
    }
}
