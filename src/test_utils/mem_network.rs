use std::collections::HashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::trace;

use crate::network::encode_datagram;
use crate::Envelope;
use crate::MemAcceptorStorage;
use crate::Result;
use crate::Transport;
use crate::TypeConfig;

#[derive(Debug, Default)]
struct NetInner {
    endpoints: HashMap<SocketAddr, mpsc::Sender<Envelope>>,
    isolated: HashSet<SocketAddr>,
    drop_rate: f64,
    max_datagram_size: Option<usize>,
}

/// In-process datagram network with loss and partitions
#[derive(Debug, Clone, Default)]
pub struct MemNetwork {
    inner: Arc<Mutex<NetInner>>,
}

impl MemNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(
        &self,
        addr: SocketAddr,
    ) -> MemTransport {
        MemTransport {
            addr,
            net: self.clone(),
        }
    }

    /// Cuts `addr` off in both directions
    pub fn isolate(
        &self,
        addr: SocketAddr,
    ) {
        self.inner.lock().isolated.insert(addr);
    }

    pub fn heal(
        &self,
        addr: SocketAddr,
    ) {
        self.inner.lock().isolated.remove(&addr);
    }

    /// Fraction of datagrams silently lost, in `[0, 1)`
    pub fn set_drop_rate(
        &self,
        rate: f64,
    ) {
        self.inner.lock().drop_rate = rate;
    }

    /// Refuses envelopes whose encoding exceeds `max`, as a UDP socket would
    pub fn set_max_datagram_size(
        &self,
        max: usize,
    ) {
        self.inner.lock().max_datagram_size = Some(max);
    }

    fn deliver(
        &self,
        target: SocketAddr,
        envelope: &Envelope,
    ) {
        let inner = self.inner.lock();
        if inner.isolated.contains(&target) || inner.isolated.contains(&envelope.from_addr) {
            trace!(%target, "partitioned, dropped");
            return;
        }
        if inner.drop_rate > 0.0 && rand::thread_rng().gen_bool(inner.drop_rate) {
            trace!(%target, "lost");
            return;
        }
        if let Some(tx) = inner.endpoints.get(&target) {
            let _ = tx.try_send(envelope.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemTransport {
    addr: SocketAddr,
    net: MemNetwork,
}

impl Transport for MemTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(
        &self,
        target: SocketAddr,
        envelope: &Envelope,
    ) -> Result<()> {
        let max_datagram_size = self.net.inner.lock().max_datagram_size;
        if let Some(max) = max_datagram_size {
            encode_datagram(envelope, max)?;
        }
        self.net.deliver(target, envelope);
        Ok(())
    }

    fn listen(
        &self,
        inbound: mpsc::Sender<Envelope>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        self.net.inner.lock().endpoints.insert(self.addr, inbound);
        let net = self.net.clone();
        let addr = self.addr;
        tokio::spawn(async move {
            let _ = shutdown.changed().await;
            net.inner.lock().endpoints.remove(&addr);
        });
        Ok(())
    }
}

/// Nodes wired over [`MemNetwork`] with in-memory acceptor state
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MemTypeConfig;

impl TypeConfig for MemTypeConfig {
    type TR = MemTransport;

    type S = MemAcceptorStorage;
}
