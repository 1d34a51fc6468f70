//! Slot-indexed membership history.
//!
//! A configuration change learned at slot `s` governs slots `>= s + alpha`.
//! Keeping every configuration with its first governed slot lets the quorum
//! of any slot be computed deterministically on every replica.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::MembershipError;
use crate::Op;

/// A cluster member and its addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub node_id: u32,
    /// UDP consensus address
    pub peer_addr: SocketAddr,
    /// TCP session address
    pub client_addr: SocketAddr,
}

/// The member set governing a range of slots
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Configuration {
    members: BTreeMap<u32, Member>,
}

impl Configuration {
    pub fn new(members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            members: members.into_iter().map(|m| (m.node_id, m)).collect(),
        }
    }

    pub fn contains(
        &self,
        node_id: u32,
    ) -> bool {
        self.members.contains_key(&node_id)
    }

    pub fn get(
        &self,
        node_id: u32,
    ) -> Option<&Member> {
        self.members.get(&node_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Strict majority of this configuration
    pub fn quorum_size(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Whether `acks` holds a strict majority of this configuration
    pub fn is_quorum(
        &self,
        acks: &HashSet<u32>,
    ) -> bool {
        let votes = self.members.keys().filter(|id| acks.contains(id)).count();
        votes >= self.quorum_size()
    }
}

/// Serializable membership history, shipped to joining nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub alpha: u64,
    /// `(first governed slot, configuration)`, ascending
    pub history: Vec<(u64, Configuration)>,
}

#[derive(Debug)]
struct Inner {
    alpha: u64,
    history: BTreeMap<u64, Arc<Configuration>>,
}

impl Inner {
    fn config_for(
        &self,
        slot: u64,
    ) -> Arc<Configuration> {
        self.history
            .range(..=slot)
            .next_back()
            .or_else(|| self.history.iter().next())
            .map(|(_, c)| c.clone())
            .unwrap_or_default()
    }

    fn latest(&self) -> Arc<Configuration> {
        self.history
            .iter()
            .next_back()
            .map(|(_, c)| c.clone())
            .unwrap_or_default()
    }
}

/// Shared membership state. Only learned log entries change it.
#[derive(Debug)]
pub struct ClusterMembership {
    inner: RwLock<Inner>,
}

impl ClusterMembership {
    /// Membership of a fresh cluster: `seed` governs every slot from 1.
    pub fn bootstrap(
        seed: Member,
        alpha: u64,
    ) -> Self {
        let mut history = BTreeMap::new();
        history.insert(1, Arc::new(Configuration::new([seed])));
        Self {
            inner: RwLock::new(Inner { alpha, history }),
        }
    }

    /// Membership of a joining node before it received its ticket
    pub fn empty(alpha: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                alpha,
                history: BTreeMap::new(),
            }),
        }
    }

    pub fn alpha(&self) -> u64 {
        self.inner.read().alpha
    }

    /// Configuration governing `slot`
    pub fn config_for(
        &self,
        slot: u64,
    ) -> Arc<Configuration> {
        self.inner.read().config_for(slot)
    }

    /// Every distinct configuration governing some slot in `[from, to]`
    pub fn configs_in(
        &self,
        from: u64,
        to: u64,
    ) -> Vec<Arc<Configuration>> {
        let inner = self.inner.read();
        let mut configs = vec![inner.config_for(from)];
        if to > from {
            configs.extend(inner.history.range(from + 1..=to).map(|(_, c)| c.clone()));
        }
        configs
    }

    /// Configuration with the highest first governed slot
    pub fn latest(&self) -> Arc<Configuration> {
        self.inner.read().latest()
    }

    /// Ids of every member of any configuration from `slot` on
    pub fn ids_from(
        &self,
        slot: u64,
    ) -> BTreeSet<u32> {
        let inner = self.inner.read();
        let mut ids: BTreeSet<u32> = inner.config_for(slot).ids().collect();
        for (_, config) in inner.history.range(slot + 1..) {
            ids.extend(config.ids());
        }
        ids
    }

    /// Looks a member up across all retained configurations, newest first
    pub fn member(
        &self,
        node_id: u32,
    ) -> Option<Member> {
        self.inner
            .read()
            .history
            .values()
            .rev()
            .find_map(|c| c.get(node_id).cloned())
    }

    /// Applies a membership operation learned at `slot`.
    ///
    /// Returns `Ok(false)` for other operations. Invalid changes are
    /// rejected identically on every replica and leave the history as is.
    pub fn apply(
        &self,
        slot: u64,
        op: &Op,
    ) -> Result<bool, MembershipError> {
        let mut inner = self.inner.write();
        let effective = slot + inner.alpha;
        let current = inner.latest();

        let next = match op {
            Op::AddMember(member) => {
                match current.get(member.node_id) {
                    Some(existing) if existing == member => {
                        debug!(slot, node_id = member.node_id, "member re-admitted unchanged");
                        return Ok(false);
                    }
                    Some(_) => return Err(MembershipError::AlreadyMember(member.node_id)),
                    None => {}
                }
                let mut next = (*current).clone();
                next.members.insert(member.node_id, member.clone());
                info!(slot, effective, node_id = member.node_id, "member added");
                next
            }
            Op::RemoveMember { node_id } => {
                if !current.contains(*node_id) {
                    return Err(MembershipError::UnknownMember(*node_id));
                }
                if current.len() == 1 {
                    return Err(MembershipError::LastMember(*node_id));
                }
                let mut next = (*current).clone();
                next.members.remove(node_id);
                info!(slot, effective, node_id, "member removed");
                next
            }
            _ => return Ok(false),
        };

        inner.history.insert(effective, Arc::new(next));
        Ok(true)
    }

    /// Drops configurations that no longer govern any slot `>= slot`.
    pub fn prune_below(
        &self,
        slot: u64,
    ) {
        let mut inner = self.inner.write();
        let keep_from = match inner.history.range(..=slot).next_back() {
            Some((first, _)) => *first,
            None => return,
        };
        inner.history = inner.history.split_off(&keep_from);
    }

    pub fn snapshot(&self) -> MembershipSnapshot {
        let inner = self.inner.read();
        MembershipSnapshot {
            alpha: inner.alpha,
            history: inner
                .history
                .iter()
                .map(|(slot, c)| (*slot, (**c).clone()))
                .collect(),
        }
    }

    /// Replaces the whole history with a snapshot taken on another member
    pub fn restore(
        &self,
        snapshot: MembershipSnapshot,
    ) {
        let mut inner = self.inner.write();
        inner.alpha = snapshot.alpha;
        inner.history = snapshot
            .history
            .into_iter()
            .map(|(slot, c)| (slot, Arc::new(c)))
            .collect();
    }
}
