//! Multi-Paxos core: rounds, log entries, acceptor, learner, proposer and
//! the consensus task that drives them.

mod acceptor;
mod consensus;
mod entry;
mod event;
mod handle;
mod learner;
mod proposer;
mod round;
mod timer;

pub use consensus::*;
pub use entry::*;
pub use event::*;
pub use handle::*;
pub use round::*;
pub(crate) use timer::*;

#[cfg(test)]
mod consensus_test;
