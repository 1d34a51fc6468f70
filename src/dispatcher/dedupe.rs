use std::collections::HashSet;
use std::collections::VecDeque;

use crate::Tag;

/// Tags applied within the last `capacity` revisions.
///
/// Every replica sees the same log, so every replica reaches the same
/// verdict for a duplicate. The window travels with join tickets.
#[derive(Debug)]
pub(crate) struct TagWindow {
    capacity: u64,
    order: VecDeque<(u64, Tag)>,
    seen: HashSet<Tag>,
}

impl TagWindow {
    pub(crate) fn new(capacity: u64) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Records `tag` at `revision`; false if it was applied within the window
    pub(crate) fn admit(
        &mut self,
        revision: u64,
        tag: Tag,
    ) -> bool {
        self.expire(revision);
        if tag.is_anonymous() {
            return true;
        }
        if !self.seen.insert(tag) {
            return false;
        }
        self.order.push_back((revision, tag));
        true
    }

    fn expire(
        &mut self,
        revision: u64,
    ) {
        while let Some((rev, tag)) = self.order.front().copied() {
            if rev + self.capacity > revision {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&tag);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn entries(&self) -> Vec<(u64, Tag)> {
        self.order.iter().copied().collect()
    }

    pub(crate) fn restore(
        &mut self,
        entries: Vec<(u64, Tag)>,
    ) {
        self.seen = entries.iter().map(|(_, tag)| *tag).collect();
        self.order = entries.into();
    }
}
