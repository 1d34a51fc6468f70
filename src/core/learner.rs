use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use super::Proposal;

/// Largest slot range requested by one Fetch
pub(crate) const FETCH_BATCH: u64 = 64;

/// Slots pruned at once, so pruning does not run on every learned slot
const PRUNE_BATCH: u64 = 256;

/// Tracks learned slots and releases them strictly in order.
pub struct Learner {
    /// Every slot up to here is learned and released
    frontier: u64,
    /// False on a joining node until its ticket is installed
    ready: bool,
    /// Learned slots above the frontier
    buffered: BTreeMap<u64, Proposal>,
    /// Released slots kept for serving Fetch
    retained: BTreeMap<u64, Proposal>,
    /// Highest frontier advertised by a leader
    known_frontier: u64,
    gap_since: Option<Instant>,
    retention: u64,
    pruned_below: u64,
}

impl Learner {
    pub fn new(
        ready: bool,
        retention: u64,
    ) -> Self {
        Self {
            frontier: 0,
            ready,
            buffered: BTreeMap::new(),
            retained: BTreeMap::new(),
            known_frontier: 0,
            gap_since: None,
            retention,
            pruned_below: 0,
        }
    }

    pub fn frontier(&self) -> u64 {
        self.frontier
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_learned(
        &self,
        slot: u64,
    ) -> bool {
        slot <= self.frontier || self.buffered.contains_key(&slot)
    }

    /// Records a learned slot and returns the slots that became contiguous.
    pub fn learn(
        &mut self,
        slot: u64,
        proposal: Proposal,
    ) -> Vec<(u64, Proposal)> {
        if slot <= self.frontier {
            trace!(slot, frontier = self.frontier, "duplicate learn");
            return Vec::new();
        }
        self.buffered.entry(slot).or_insert(proposal);
        self.release()
    }

    /// Notes the frontier a leader advertised
    pub fn note_frontier(
        &mut self,
        frontier: u64,
    ) {
        self.known_frontier = self.known_frontier.max(frontier);
    }

    /// Jumps to `revision` after a join ticket was installed.
    pub fn restore(
        &mut self,
        revision: u64,
    ) -> Vec<(u64, Proposal)> {
        debug!(revision, buffered = self.buffered.len(), "learner restored");
        self.frontier = revision;
        self.pruned_below = revision;
        self.ready = true;
        self.retained.clear();
        self.buffered = self.buffered.split_off(&(revision + 1));
        self.gap_since = None;
        self.release()
    }

    fn release(&mut self) -> Vec<(u64, Proposal)> {
        let mut released = Vec::new();
        if !self.ready {
            return released;
        }
        while let Some(proposal) = self.buffered.remove(&(self.frontier + 1)) {
            self.frontier += 1;
            self.retained.insert(self.frontier, proposal.clone());
            released.push((self.frontier, proposal));
        }
        if !released.is_empty() {
            self.gap_since = None;
        }
        released
    }

    fn highest_known(&self) -> u64 {
        let buffered = self.buffered.keys().next_back().copied().unwrap_or(0);
        self.known_frontier.max(buffered)
    }

    /// Returns the slot range to fetch once a gap has been open for `fill_timeout`.
    pub fn poll_gap(
        &mut self,
        now: Instant,
        fill_timeout: Duration,
    ) -> Option<(u64, u64)> {
        let highest = self.highest_known();
        if !self.ready || highest <= self.frontier {
            self.gap_since = None;
            return None;
        }

        let since = *self.gap_since.get_or_insert(now);
        if now.saturating_duration_since(since) < fill_timeout {
            return None;
        }
        self.gap_since = Some(now);
        let to = highest.min(self.frontier + FETCH_BATCH);
        Some((self.frontier + 1, to))
    }

    /// Released slots in `[from, to]` still retained
    pub fn retained(
        &self,
        from: u64,
        to: u64,
    ) -> Vec<(u64, Proposal)> {
        if from > to {
            return Vec::new();
        }
        let to = to.min(from.saturating_add(FETCH_BATCH - 1));
        self.retained
            .range(from..=to)
            .map(|(slot, p)| (*slot, p.clone()))
            .collect()
    }

    /// Drops retained slots older than the retention window.
    ///
    /// Returns the new lowest retained slot when anything was pruned.
    pub fn prune(&mut self) -> Option<u64> {
        let floor = self.frontier.saturating_sub(self.retention);
        if floor < self.pruned_below + PRUNE_BATCH {
            return None;
        }
        self.retained = self.retained.split_off(&floor);
        self.pruned_below = floor;
        debug!(floor, "learner pruned");
        Some(floor)
    }
}
