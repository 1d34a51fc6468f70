use std::collections::BTreeMap;

use tracing::debug;
use tracing::trace;

use super::PeerMessage;
use super::Proposal;
use super::Round;
use crate::AcceptorStorage;
use crate::Result;

/// Paxos acceptor.
///
/// One promised round covers every slot from the Prepare's `from_slot` on;
/// accepted values are kept per slot. State is persisted before any reply
/// leaves the node.
pub struct Acceptor<S>
where
    S: AcceptorStorage,
{
    storage: S,
    promised: Round,
    low_water: u64,
    accepted: BTreeMap<u64, (Round, Proposal)>,
}

impl<S> Acceptor<S>
where
    S: AcceptorStorage,
{
    pub fn new(storage: S) -> Result<Self> {
        let state = storage.load()?;
        debug!(
            promised = %state.promised,
            low_water = state.low_water,
            accepted = state.accepted.len(),
            "acceptor state loaded"
        );
        Ok(Self {
            storage,
            promised: state.promised,
            low_water: state.low_water,
            accepted: state.accepted,
        })
    }

    pub fn promised(&self) -> Round {
        self.promised
    }

    pub fn low_water(&self) -> u64 {
        self.low_water
    }

    /// Phase 1b.
    ///
    /// `frontier` is the local learned frontier; values at or below it are
    /// chosen and left to the candidate to fetch.
    pub fn handle_prepare(
        &mut self,
        round: Round,
        from_slot: u64,
        frontier: u64,
    ) -> Result<PeerMessage> {
        if from_slot < self.low_water || round < self.promised {
            trace!(%round, promised = %self.promised, from_slot, "prepare refused");
            return Ok(self.nack(round));
        }

        if round > self.promised {
            self.storage.save_promise(round)?;
            self.promised = round;
        }

        let floor = from_slot.max(frontier + 1);
        let accepted = self
            .accepted
            .range(floor..)
            .map(|(slot, (r, p))| (*slot, *r, p.clone()))
            .collect();

        Ok(PeerMessage::Promise {
            round,
            from_slot,
            frontier,
            accepted,
        })
    }

    /// Phase 2b
    pub fn handle_accept(
        &mut self,
        round: Round,
        slot: u64,
        proposal: Proposal,
    ) -> Result<PeerMessage> {
        if slot < self.low_water || round < self.promised {
            trace!(%round, promised = %self.promised, slot, "accept refused");
            return Ok(self.nack(round));
        }

        if round > self.promised {
            self.storage.save_promise(round)?;
            self.promised = round;
        }
        self.storage.save_accepted(slot, round, &proposal)?;
        self.accepted.insert(slot, (round, proposal));

        Ok(PeerMessage::Accepted { round, slot })
    }

    /// Forgets accepted values below `slot`
    pub fn prune_below(
        &mut self,
        slot: u64,
    ) -> Result<()> {
        if slot <= self.low_water {
            return Ok(());
        }
        self.storage.prune_below(slot)?;
        self.accepted = self.accepted.split_off(&slot);
        self.low_water = slot;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.storage.flush()
    }

    fn nack(
        &self,
        round: Round,
    ) -> PeerMessage {
        PeerMessage::Nack {
            round,
            promised: self.promised,
            low_water: self.low_water,
        }
    }
}
