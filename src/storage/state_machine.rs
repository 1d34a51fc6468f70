//! Deterministic versioned store driven by the committed log.
//!
//! Every revision is an immutable tree; applying an entry copies only the
//! nodes on the mutated path and shares every other subtree with the
//! previous revision. The head is published through [`ArcSwap`] so readers
//! never take a lock; a bounded window of recent versions serves reads at
//! older revisions. Snapshots hold their [`Version`] directly and keep it
//! alive after it leaves the window.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use super::glob::Glob;
use super::glob::Segment;
use super::path;
use crate::Cas;
use crate::ClientError;
use crate::Event;
use crate::Op;
use crate::ReadResult;
use crate::Result;
use crate::StorageError;
use crate::Value;

#[derive(Debug, Clone, Default)]
struct TreeNode {
    value: Option<Value>,
    children: BTreeMap<String, Arc<TreeNode>>,
}

impl TreeNode {
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    fn cas(&self) -> Cas {
        match &self.value {
            Some(v) => Cas::Rev(v.rev),
            None => Cas::Dir,
        }
    }

    fn lookup<'a, 'p>(
        &'a self,
        mut names: impl Iterator<Item = &'p str>,
    ) -> Option<&'a TreeNode> {
        match names.next() {
            None => Some(self),
            Some(name) => self.children.get(name)?.lookup(names),
        }
    }

    /// Returns a copy of this node with `value` installed at `names`.
    fn with_value(
        &self,
        names: &[&str],
        value: Value,
    ) -> TreeNode {
        let mut copy = self.clone();
        match names.split_first() {
            None => copy.value = Some(value),
            Some((name, rest)) => {
                let child = match self.children.get(*name) {
                    Some(child) => child.with_value(rest, value),
                    None => TreeNode::default().with_value(rest, value),
                };
                copy.children.insert((*name).to_string(), Arc::new(child));
            }
        }
        copy
    }

    /// Returns a copy of this node with the value at `names` removed.
    /// Nodes left with neither value nor children are pruned.
    fn without_value(
        &self,
        names: &[&str],
    ) -> TreeNode {
        let mut copy = self.clone();
        match names.split_first() {
            None => copy.value = None,
            Some((name, rest)) => {
                if let Some(child) = self.children.get(*name) {
                    let child = child.without_value(rest);
                    if child.is_empty() {
                        copy.children.remove(*name);
                    } else {
                        copy.children.insert((*name).to_string(), Arc::new(child));
                    }
                }
            }
        }
        copy
    }

    fn read(&self) -> ReadResult {
        match &self.value {
            Some(v) => ReadResult {
                body: v.body.clone(),
                cas: Cas::Rev(v.rev),
            },
            None => {
                let names: Vec<&str> = self.children.keys().map(String::as_str).collect();
                ReadResult {
                    body: Bytes::from(names.join("\n")),
                    cas: Cas::Dir,
                }
            }
        }
    }

    /// Depth-first collection of every value in this subtree, in sorted order
    fn collect(
        &self,
        path: &str,
        out: &mut Vec<(String, Value)>,
    ) {
        if let Some(v) = &self.value {
            out.push((path.to_string(), v.clone()));
        }
        for (name, child) in &self.children {
            child.collect(&path::join(path, name), out);
        }
    }

    fn walk(
        &self,
        path: &str,
        segments: &[Segment],
        out: &mut Vec<(String, Value)>,
    ) {
        match segments.split_first() {
            None => {
                if let Some(v) = &self.value {
                    out.push((path.to_string(), v.clone()));
                }
            }
            Some((Segment::Rest, _)) => self.collect(path, out),
            Some((seg, rest)) => {
                for (name, child) in &self.children {
                    if seg.matches(name) {
                        child.walk(&path::join(path, name), rest, out);
                    }
                }
            }
        }
    }
}

/// Immutable store contents at one revision
#[derive(Debug)]
pub struct Version {
    revision: u64,
    root: Arc<TreeNode>,
}

impl Version {
    fn genesis() -> Self {
        let root = TreeNode::default().with_value(
            &[&path::PING_PATH[1..]],
            Value {
                body: Bytes::from_static(path::PING_BODY),
                rev: 0,
            },
        );
        Self {
            revision: 0,
            root: Arc::new(root),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Reads a path: a file, the directory sentinel, or missing.
    pub fn read(
        &self,
        path: &str,
    ) -> ReadResult {
        match self.root.lookup(path::segments(path)) {
            Some(node) => node.read(),
            None => ReadResult::missing(),
        }
    }

    /// Current cas of a path
    pub fn cas(
        &self,
        path: &str,
    ) -> Cas {
        self.root
            .lookup(path::segments(path))
            .map(TreeNode::cas)
            .unwrap_or(Cas::Missing)
    }

    /// Every file matching `glob`, in sorted depth-first order
    pub fn walk(
        &self,
        glob: &Glob,
    ) -> Vec<Event> {
        let mut found = Vec::new();
        self.root.walk(path::ROOT, glob.segments(), &mut found);
        found
            .into_iter()
            .map(|(path, v)| Event {
                path,
                body: v.body,
                cas: Cas::Rev(v.rev),
                rev: self.revision,
            })
            .collect()
    }

    /// Full dump of every file
    pub fn entries(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        self.root.collect(path::ROOT, &mut out);
        out
    }

    fn from_entries(
        revision: u64,
        entries: Vec<(String, Value)>,
    ) -> Self {
        let root = entries.into_iter().fold(TreeNode::default(), |root, (path, value)| {
            let names: Vec<&str> = path::segments(&path).collect();
            root.with_value(&names, value)
        });
        Self {
            revision,
            root: Arc::new(root),
        }
    }
}

/// Deterministic result of applying one committed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The path was written or deleted
    Applied { cas: Cas, event: Event },
    /// CAS mismatch; the store is unchanged
    PreconditionFailed { current: Cas },
    /// Deterministic rejection; the store is unchanged
    Rejected(ClientError),
    /// Entry carried no store mutation
    Noop,
}

/// Head version plus a bounded window of recent versions
#[derive(Debug)]
pub struct VersionedStore {
    head: ArcSwap<Version>,
    history: RwLock<BTreeMap<u64, Arc<Version>>>,
    history_window: usize,
}

impl VersionedStore {
    pub fn new(history_window: usize) -> Self {
        let genesis = Arc::new(Version::genesis());
        let mut history = BTreeMap::new();
        history.insert(0, genesis.clone());
        Self {
            head: ArcSwap::new(genesis),
            history: RwLock::new(history),
            history_window: history_window.max(1),
        }
    }

    pub fn head(&self) -> Arc<Version> {
        self.head.load_full()
    }

    pub fn revision(&self) -> u64 {
        self.head.load().revision
    }

    /// Reads at the head without locking
    pub fn read(
        &self,
        path: &str,
    ) -> ReadResult {
        self.head.load().read(path)
    }

    pub fn read_at(
        &self,
        path: &str,
        revision: u64,
    ) -> Result<ReadResult> {
        Ok(self.version(revision)?.read(path))
    }

    /// Version at `revision` if it is the head or still in the history window
    pub fn version(
        &self,
        revision: u64,
    ) -> Result<Arc<Version>> {
        let head = self.head();
        if revision == head.revision {
            return Ok(head);
        }
        if revision > head.revision {
            return Err(StorageError::RevisionNotApplied {
                requested: revision,
                head: head.revision,
            }
            .into());
        }
        self.history
            .read()
            .get(&revision)
            .cloned()
            .ok_or_else(|| StorageError::RevisionCompacted(revision).into())
    }

    /// Applies `op` as revision `revision`, which must be `head + 1`.
    ///
    /// Every call advances the head by one revision, whether or not the
    /// operation changes any path.
    pub fn apply(
        &self,
        revision: u64,
        op: &Op,
    ) -> Result<ApplyOutcome> {
        let head = self.head();
        if revision != head.revision + 1 {
            return Err(StorageError::OutOfOrder {
                expected: head.revision + 1,
                actual: revision,
            }
            .into());
        }

        let (root, outcome) = match op {
            Op::Set { path, cas, body } => Self::apply_set(&head, revision, path, *cas, body),
            Op::Del { path, cas } => Self::apply_del(&head, revision, path, *cas),
            Op::Nop | Op::AddMember(_) | Op::RemoveMember { .. } => (None, ApplyOutcome::Noop),
        };

        let next = Arc::new(Version {
            revision,
            root: root.unwrap_or_else(|| head.root.clone()),
        });
        self.publish(next);

        trace!(revision, ?outcome, "applied");
        Ok(outcome)
    }

    fn check_writable(
        head: &Version,
        path: &str,
        cas: Cas,
    ) -> std::result::Result<Cas, ApplyOutcome> {
        if let Err(e) = path::validate_path(path) {
            return Err(ApplyOutcome::Rejected(e));
        }
        if cas == Cas::Dir {
            return Err(ApplyOutcome::Rejected(ClientError::InvalidCas(cas)));
        }
        if path == path::PING_PATH {
            return Err(ApplyOutcome::Rejected(ClientError::ReadOnly(path.to_string())));
        }
        let current = head.cas(path);
        if current == Cas::Dir {
            return Err(ApplyOutcome::Rejected(ClientError::IsDirectory(path.to_string())));
        }
        Ok(current)
    }

    fn apply_set(
        head: &Version,
        revision: u64,
        path: &str,
        cas: Cas,
        body: &Bytes,
    ) -> (Option<Arc<TreeNode>>, ApplyOutcome) {
        let current = match Self::check_writable(head, path, cas) {
            Ok(current) => current,
            Err(outcome) => return (None, outcome),
        };
        if !cas.admits(current) {
            return (None, ApplyOutcome::PreconditionFailed { current });
        }

        let names: Vec<&str> = path::segments(path).collect();
        let value = Value {
            body: body.clone(),
            rev: revision,
        };
        let root = head.root.with_value(&names, value);
        let outcome = ApplyOutcome::Applied {
            cas: Cas::Rev(revision),
            event: Event {
                path: path.to_string(),
                body: body.clone(),
                cas: Cas::Rev(revision),
                rev: revision,
            },
        };
        (Some(Arc::new(root)), outcome)
    }

    fn apply_del(
        head: &Version,
        revision: u64,
        path: &str,
        cas: Cas,
    ) -> (Option<Arc<TreeNode>>, ApplyOutcome) {
        let current = match Self::check_writable(head, path, cas) {
            Ok(current) => current,
            Err(outcome) => return (None, outcome),
        };
        if current.is_missing() {
            return (None, ApplyOutcome::Rejected(ClientError::NotFound(path.to_string())));
        }
        if !cas.admits(current) {
            return (None, ApplyOutcome::PreconditionFailed { current });
        }

        let names: Vec<&str> = path::segments(path).collect();
        let root = head.root.without_value(&names);
        let outcome = ApplyOutcome::Applied {
            cas: Cas::Missing,
            event: Event {
                path: path.to_string(),
                body: Bytes::new(),
                cas: Cas::Missing,
                rev: revision,
            },
        };
        (Some(Arc::new(root)), outcome)
    }

    fn publish(
        &self,
        next: Arc<Version>,
    ) {
        let mut history = self.history.write();
        history.insert(next.revision, next.clone());
        while history.len() > self.history_window {
            history.pop_first();
        }
        self.head.store(next);
    }

    /// Replaces the whole store with a dump taken at `revision`.
    pub fn restore(
        &self,
        revision: u64,
        entries: Vec<(String, Value)>,
    ) {
        let version = Arc::new(Version::from_entries(revision, entries));
        let mut history = self.history.write();
        history.clear();
        history.insert(revision, version.clone());
        self.head.store(version);
        debug!(revision, "store restored");
    }
}
