//! Applies the learned log to the store and fans results out to waiting
//! proposers and watchers.

mod applier;
mod dedupe;
mod watch;

pub use applier::*;
pub(crate) use dedupe::*;
pub use watch::*;

#[cfg(test)]
mod applier_test;
