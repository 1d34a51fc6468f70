//! A strongly consistent hierarchical coordination store.
//!
//! Replicas order every mutation through Multi-Paxos and apply it to a
//! copy-on-write versioned tree. Clients write with compare-and-swap, read at
//! the head or inside snapshots, and follow changes with glob watches.

mod client;
mod config;
mod core;
mod dispatcher;
mod errors;
mod membership;
mod network;
mod node;
mod storage;
mod type_config;
mod utils;

pub use crate::core::*;

pub use client::*;
pub use config::*;
pub use dispatcher::*;
pub use errors::*;
pub use membership::*;
pub use network::*;
pub use node::*;
pub use storage::*;
pub use type_config::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
