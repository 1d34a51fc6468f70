use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::Configuration;

/// Leader-side liveness tracking of members.
///
/// The leader notes the last time it heard from each member; a member silent
/// for longer than `member_timeout` is reported once until it is heard from
/// again or the tracker is reset.
#[derive(Debug)]
pub(crate) struct HealthChecker {
    member_timeout: Duration,
    last_seen: HashMap<u32, Instant>,
    reported: HashSet<u32>,
}

impl HealthChecker {
    pub(crate) fn new(member_timeout: Duration) -> Self {
        Self {
            member_timeout,
            last_seen: HashMap::new(),
            reported: HashSet::new(),
        }
    }

    /// Starts every member's silence clock at `now`. Called on winning an election.
    pub(crate) fn reset(
        &mut self,
        config: &Configuration,
        now: Instant,
    ) {
        self.last_seen = config.ids().map(|id| (id, now)).collect();
        self.reported.clear();
    }

    pub(crate) fn observe(
        &mut self,
        node_id: u32,
        now: Instant,
    ) {
        self.last_seen.insert(node_id, now);
        self.reported.remove(&node_id);
    }

    /// Members of `config` silent past the timeout that were not reported yet
    pub(crate) fn newly_silent(
        &mut self,
        config: &Configuration,
        self_id: u32,
        now: Instant,
    ) -> Vec<u32> {
        let mut silent = Vec::new();
        for id in config.ids() {
            if id == self_id || self.reported.contains(&id) {
                continue;
            }
            let seen = *self.last_seen.entry(id).or_insert(now);
            if now.saturating_duration_since(seen) > self.member_timeout {
                debug!(node_id = id, "member silent past timeout");
                self.reported.insert(id);
                silent.push(id);
            }
        }
        silent
    }
}
