use std::fmt;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::Cas;
use crate::Member;

/// Unique identity of a client submission.
///
/// `incarnation` is drawn at random when a node starts, so tags from a
/// restarted process never collide with its earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Tag {
    pub node_id: u32,
    pub incarnation: u64,
    pub seq: u64,
}

impl Tag {
    /// Tag of leader-generated fill entries. Never deduplicated.
    pub const ANONYMOUS: Tag = Tag {
        node_id: 0,
        incarnation: 0,
        seq: 0,
    };

    pub fn is_anonymous(&self) -> bool {
        self.node_id == 0
    }
}

impl fmt::Display for Tag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{:x}/{}", self.node_id, self.incarnation, self.seq)
    }
}

/// Operation carried by a log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Nop,
    Set { path: String, cas: Cas, body: Bytes },
    Del { path: String, cas: Cas },
    AddMember(Member),
    RemoveMember { node_id: u32 },
}

impl Op {
    pub fn is_membership_change(&self) -> bool {
        matches!(self, Op::AddMember(_) | Op::RemoveMember { .. })
    }
}

/// A value proposed for one slot of the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub tag: Tag,
    pub op: Op,
}

impl Proposal {
    pub fn new(
        tag: Tag,
        op: Op,
    ) -> Self {
        Self { tag, op }
    }

    /// Leader fill for a slot with no reported value
    pub fn nop() -> Self {
        Self {
            tag: Tag::ANONYMOUS,
            op: Op::Nop,
        }
    }
}
