use std::fmt;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

/// Compare-and-swap token.
///
/// Reads report `Rev` for a file, `Dir` for a directory and `Missing` for an
/// absent path. Writes take `Missing`, `Clobber` or `Rev` as a precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cas {
    /// Path does not exist
    #[default]
    Missing,
    /// Unconditional write
    Clobber,
    /// Path is a directory; never valid as a write precondition
    Dir,
    /// Path was last written at this revision
    Rev(u64),
}

impl Cas {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cas::Missing)
    }

    pub fn revision(&self) -> Option<u64> {
        match self {
            Cas::Rev(r) => Some(*r),
            _ => None,
        }
    }

    /// Whether a path currently at `current` satisfies this precondition.
    pub(crate) fn admits(
        &self,
        current: Cas,
    ) -> bool {
        match self {
            Cas::Clobber => true,
            Cas::Missing => current.is_missing(),
            Cas::Rev(r) => current == Cas::Rev(*r),
            Cas::Dir => false,
        }
    }
}

impl fmt::Display for Cas {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Cas::Missing => write!(f, "missing"),
            Cas::Clobber => write!(f, "clobber"),
            Cas::Dir => write!(f, "dir"),
            Cas::Rev(r) => write!(f, "{r}"),
        }
    }
}

/// A stored file value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub body: Bytes,
    /// Revision that last wrote this value
    pub rev: u64,
}

/// Result of reading one path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadResult {
    pub body: Bytes,
    pub cas: Cas,
}

impl ReadResult {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// A committed mutation as observed by watchers and walkers.
///
/// Deletes carry `Cas::Missing` and an empty body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub path: String,
    pub body: Bytes,
    pub cas: Cas,
    pub rev: u64,
}

impl Event {
    pub fn is_delete(&self) -> bool {
        self.cas.is_missing()
    }
}
