//! Session-scoped registry of pinned store versions.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::state_machine::Version;
use crate::ClientError;

/// Pins store versions under small positive ids.
///
/// Ids are allocated as the smallest unused positive integer, so an id is
/// reused once its snapshot has been deleted. Dropping the registry releases
/// every snapshot it holds.
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    snapshots: Mutex<BTreeMap<u32, Arc<Version>>>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `version` and returns its id
    pub fn pin(
        &self,
        version: Arc<Version>,
    ) -> u32 {
        let mut snapshots = self.snapshots.lock();
        // keys are sorted: the first hole in 1, 2, 3, ... is the smallest free id
        let mut id = 1;
        for taken in snapshots.keys() {
            if *taken != id {
                break;
            }
            id += 1;
        }
        debug!(id, revision = version.revision(), "snapshot pinned");
        snapshots.insert(id, version);
        id
    }

    pub fn get(
        &self,
        id: u32,
    ) -> Result<Arc<Version>, ClientError> {
        self.snapshots
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ClientError::InvalidSnapshot(id))
    }

    pub fn release(
        &self,
        id: u32,
    ) -> Result<(), ClientError> {
        match self.snapshots.lock().remove(&id) {
            Some(v) => {
                debug!(id, revision = v.revision(), "snapshot released");
                Ok(())
            }
            None => Err(ClientError::InvalidSnapshot(id)),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.snapshots.lock().clear();
    }
}
