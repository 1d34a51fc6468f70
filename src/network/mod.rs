//! Network layer.
//!
//! Peers exchange consensus messages as single UDP datagrams through a
//! [`Transport`]; clients talk to a node over the TCP session protocol in
//! [`session`].

pub mod session;
mod udp_transport;

pub use session::protocol;
pub(crate) use session::SessionServer;
pub use udp_transport::*;


use std::net::SocketAddr;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::Envelope;
use crate::Result;

/// Datagram delivery between consensus peers.
///
/// Delivery is best effort: messages may be lost, duplicated or reordered.
/// The consensus layer retransmits whatever it still needs.
#[cfg_attr(test, automock)]
pub trait Transport: Send + Sync + 'static {
    /// Address peers use to reach this node
    fn local_addr(&self) -> SocketAddr;

    /// Sends one envelope without waiting.
    ///
    /// # Errors
    /// - `NetworkError::DatagramTooLarge` if the encoded envelope exceeds the datagram limit
    /// - `NetworkError::DatagramDropped` if the socket buffer is full
    fn send(
        &self,
        target: SocketAddr,
        envelope: &Envelope,
    ) -> Result<()>;

    /// Starts delivering inbound envelopes to `inbound` until `shutdown` fires.
    fn listen(
        &self,
        inbound: mpsc::Sender<Envelope>,
        shutdown: watch::Receiver<()>,
    ) -> Result<()>;
}
