//! Durable acceptor state: the promised round and the per-slot accepted values.

use std::collections::BTreeMap;
use std::path::Path;

#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use sled::Batch;
use tracing::debug;
use tracing::warn;

use crate::Proposal;
use crate::Result;
use crate::Round;
use crate::StorageError;

const PROMISED_KEY: &[u8] = b"promised";
const LOW_WATER_KEY: &[u8] = b"low_water";
const META_TREE: &str = "acceptor_meta";
const ACCEPTED_TREE: &str = "acceptor_accepted";

/// State recovered by an acceptor on start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptorState {
    pub promised: Round,
    /// Slots below this mark have been pruned
    pub low_water: u64,
    pub accepted: BTreeMap<u64, (Round, Proposal)>,
}

#[cfg_attr(test, automock)]
pub trait AcceptorStorage: Send + Sync + 'static {
    fn load(&self) -> Result<AcceptorState>;

    fn save_promise(
        &self,
        round: Round,
    ) -> Result<()>;

    fn save_accepted(
        &self,
        slot: u64,
        round: Round,
        proposal: &Proposal,
    ) -> Result<()>;

    /// Removes accepted values of every slot below `slot`
    fn prune_below(
        &self,
        slot: u64,
    ) -> Result<()>;

    fn flush(&self) -> Result<()>;
}

/// Volatile acceptor storage for tests and throwaway nodes
#[derive(Debug, Default)]
pub struct MemAcceptorStorage {
    state: Mutex<AcceptorState>,
}

impl MemAcceptorStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AcceptorStorage for MemAcceptorStorage {
    fn load(&self) -> Result<AcceptorState> {
        Ok(self.state.lock().clone())
    }

    fn save_promise(
        &self,
        round: Round,
    ) -> Result<()> {
        self.state.lock().promised = round;
        Ok(())
    }

    fn save_accepted(
        &self,
        slot: u64,
        round: Round,
        proposal: &Proposal,
    ) -> Result<()> {
        self.state.lock().accepted.insert(slot, (round, proposal.clone()));
        Ok(())
    }

    fn prune_below(
        &self,
        slot: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.accepted = state.accepted.split_off(&slot);
        state.low_water = state.low_water.max(slot);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Sled-backed acceptor storage
pub struct SledAcceptorStorage {
    meta: sled::Tree,
    accepted: sled::Tree,
}

impl SledAcceptorStorage {
    /// Opens the acceptor database under `db_root_dir/acceptor_<node_id>`,
    /// or a temporary database removed on drop when no directory is given.
    pub fn open(
        db_root_dir: Option<&Path>,
        node_id: u32,
    ) -> Result<Self> {
        let config = match db_root_dir {
            Some(root) => {
                let path = root.join(format!("acceptor_{node_id}"));
                debug!("open acceptor db at {:?}", path);
                sled::Config::default().path(path)
            }
            None => {
                debug!("open temporary acceptor db");
                sled::Config::default().temporary(true)
            }
        };

        let db = config.flush_every_ms(Some(10)).use_compression(true).open().map_err(|e| {
            warn!("open acceptor db failed: {:?}", e);
            StorageError::DbError(e.to_string())
        })?;

        Ok(Self {
            meta: db.open_tree(META_TREE)?,
            accepted: db.open_tree(ACCEPTED_TREE)?,
        })
    }

    #[inline]
    fn slot_to_key(slot: u64) -> [u8; 8] {
        slot.to_be_bytes()
    }

    fn key_to_slot(key: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = key
            .try_into()
            .map_err(|_| StorageError::DbError(format!("malformed slot key of {} bytes", key.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl AcceptorStorage for SledAcceptorStorage {
    fn load(&self) -> Result<AcceptorState> {
        let promised = match self.meta.get(PROMISED_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes).map_err(StorageError::BincodeError)?,
            None => Round::ZERO,
        };
        let low_water = match self.meta.get(LOW_WATER_KEY)? {
            Some(bytes) => Self::key_to_slot(&bytes)?,
            None => 0,
        };

        let mut accepted = BTreeMap::new();
        for item in self.accepted.iter() {
            let (key, value) = item?;
            let slot = Self::key_to_slot(&key)?;
            let entry: (Round, Proposal) = bincode::deserialize(&value).map_err(StorageError::BincodeError)?;
            accepted.insert(slot, entry);
        }

        Ok(AcceptorState {
            promised,
            low_water,
            accepted,
        })
    }

    fn save_promise(
        &self,
        round: Round,
    ) -> Result<()> {
        let bytes = bincode::serialize(&round).map_err(StorageError::BincodeError)?;
        self.meta.insert(PROMISED_KEY, bytes)?;
        Ok(())
    }

    fn save_accepted(
        &self,
        slot: u64,
        round: Round,
        proposal: &Proposal,
    ) -> Result<()> {
        let bytes = bincode::serialize(&(round, proposal)).map_err(StorageError::BincodeError)?;
        self.accepted.insert(Self::slot_to_key(slot), bytes)?;
        Ok(())
    }

    fn prune_below(
        &self,
        slot: u64,
    ) -> Result<()> {
        let mut batch = Batch::default();
        for item in self.accepted.range(..Self::slot_to_key(slot)) {
            let (key, _) = item?;
            batch.remove(key);
        }
        self.accepted.apply_batch(batch)?;
        self.meta.insert(LOW_WATER_KEY, Self::slot_to_key(slot).to_vec())?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.meta.flush()?;
        self.accepted.flush()?;
        Ok(())
    }
}
