use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Transport;
use crate::Envelope;
use crate::NetworkError;
use crate::Result;

/// Consensus transport over a single UDP socket.
///
/// Each envelope is one bincode-encoded datagram.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    max_datagram_size: usize,
}

impl UdpTransport {
    pub async fn bind(
        addr: SocketAddr,
        max_datagram_size: usize,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(NetworkError::Io)?;
        let local_addr = socket.local_addr().map_err(NetworkError::Io)?;
        debug!(%local_addr, "udp transport bound");
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            max_datagram_size,
        })
    }
}

/// Encodes an envelope, refusing anything over `max` bytes
pub(crate) fn encode_datagram(
    envelope: &Envelope,
    max: usize,
) -> Result<Vec<u8>> {
    let size = envelope.encoded_len();
    if size > max {
        return Err(NetworkError::DatagramTooLarge { size, max }.into());
    }
    Ok(bincode::serialize(envelope)?)
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send(
        &self,
        target: SocketAddr,
        envelope: &Envelope,
    ) -> Result<()> {
        let buf = encode_datagram(envelope, self.max_datagram_size)?;
        match self.socket.try_send_to(&buf, target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(NetworkError::DatagramDropped(target).into()),
            Err(e) => Err(NetworkError::Io(e).into()),
        }
    }

    fn listen(
        &self,
        inbound: mpsc::Sender<Envelope>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let socket = self.socket.clone();
        let max = self.max_datagram_size;
        tokio::spawn(async move {
            let mut buf = vec![0u8; max.max(1)];
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        debug!("udp receiver stopped");
                        return;
                    }
                    received = socket.recv_from(&mut buf) => {
                        let (len, from) = match received {
                            Ok(r) => r,
                            Err(e) => {
                                // ICMP port unreachable surfaces here on some platforms
                                trace!(error = %e, "udp receive failed");
                                continue;
                            }
                        };
                        let envelope: Envelope = match bincode::deserialize(&buf[..len]) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                warn!(%from, error = %e, "dropping malformed datagram");
                                continue;
                            }
                        };
                        if inbound.send(envelope).await.is_err() {
                            debug!("inbound channel closed, udp receiver stopped");
                            return;
                        }
                    }
                }
            }
        });
        Ok(())
    }
}
