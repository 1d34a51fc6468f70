use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Paxos ballot.
///
/// Ordered by `number` first and `node_id` second, so two proposers never
/// share a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Round {
    pub number: u64,
    pub node_id: u32,
}

impl Round {
    pub const ZERO: Round = Round { number: 0, node_id: 0 };

    pub fn new(
        number: u64,
        node_id: u32,
    ) -> Self {
        Self { number, node_id }
    }

    /// Smallest round owned by `node_id` that beats `self`
    pub fn next_for(
        &self,
        node_id: u32,
    ) -> Self {
        Self {
            number: self.number + 1,
            node_id,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}.{}", self.number, self.node_id)
    }
}
