use std::net::SocketAddr;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ClientBuilder;
use super::ClientConfig;
use super::EventStream;
use crate::network::session::protocol;
use crate::network::session::protocol::Request;
use crate::network::session::protocol::Response;
use crate::network::session::protocol::Verb;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::Cas;
use crate::ClientError;
use crate::Glob;
use crate::JoinTicket;
use crate::Member;
use crate::ReadResult;
use crate::Result;

type Pending = Arc<DashMap<u32, mpsc::Sender<Response>>>;

type ClientResult<T> = std::result::Result<T, ClientError>;

/// Async client of one node's session server.
///
/// Requests are multiplexed over a single connection by tag; cloning the
/// client shares the connection. Snapshots belong to the connection and are
/// released when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    addr: SocketAddr,
    config: ClientConfig,
    next_tag: Arc<AtomicU32>,
    pending: Pending,
    frame_tx: mpsc::Sender<Bytes>,
    token: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn closed() -> ClientError {
    ClientError::Unavailable("connection closed".into())
}

impl Client {
    /// Connect to `addr` with the default configuration
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with(addr, ClientConfig::default()).await
    }

    pub fn builder(addr: SocketAddr) -> ClientBuilder {
        ClientBuilder::new(addr)
    }

    pub(super) async fn connect_with(
        addr: SocketAddr,
        config: ClientConfig,
    ) -> Result<Self> {
        let stream = task_with_timeout_and_exponential_backoff(
            || async move { Ok::<_, crate::Error>(TcpStream::connect(addr).await?) },
            config.connect,
        )
        .await?;
        debug!(%addr, "connected");

        let framed = Framed::new(stream, protocol::codec(config.max_frame_length));
        let (mut sink, mut frames) = framed.split();
        let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(config.stream_buffer_size.max(1));
        let pending: Pending = Arc::new(DashMap::new());
        let token = CancellationToken::new();
        let next_tag = Arc::new(AtomicU32::new(1));

        let writer_token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = writer_token.cancelled() => break,
                    frame = frame_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = sink.send(frame).await {
                            debug!(%addr, error = %e, "write failed");
                            break;
                        }
                    }
                }
            }
        });

        let reader_token = token.clone();
        let reader_pending = pending.clone();
        let reader_tags = next_tag.clone();
        let reader_frames = frame_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = reader_token.cancelled() => break,
                    frame = frames.next() => {
                        let frame = match frame {
                            Some(Ok(frame)) => frame,
                            Some(Err(e)) => {
                                warn!(%addr, error = %e, "malformed frame from server");
                                break;
                            }
                            None => break,
                        };
                        let response = match protocol::decode::<Response>(&frame) {
                            Ok(response) => response,
                            Err(e) => {
                                warn!(%addr, error = %e, "undecodable response");
                                continue;
                            }
                        };
                        if let Some(target) = route(&reader_pending, response) {
                            warn!(%addr, target, "stream not drained, cancelling it");
                            let tag = reader_tags.fetch_add(1, Ordering::Relaxed);
                            let cancel = protocol::encode(&Request {
                                tag,
                                verb: Verb::Cancel { target },
                            });
                            if let Ok(frame) = cancel {
                                let _ = reader_frames.try_send(frame);
                            }
                        }
                    }
                }
            }
            // stops the writer and wakes every waiter with a closed channel
            reader_token.cancel();
            reader_pending.clear();
            debug!(%addr, "connection closed");
        });

        Ok(Self {
            inner: Arc::new(ClientInner {
                addr,
                config,
                next_tag,
                pending,
                frame_tx,
                token,
            }),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Sends a request; responses arrive on the returned channel
    pub(super) async fn request(
        &self,
        verb: Verb,
    ) -> ClientResult<(u32, mpsc::Receiver<Response>)> {
        if self.inner.token.is_cancelled() {
            return Err(closed());
        }
        let tag = self.inner.next_tag.fetch_add(1, Ordering::Relaxed);
        let frame = protocol::encode(&Request { tag, verb }).map_err(|e| ClientError::Internal(e.to_string()))?;
        // one slot stays free for the overflow error
        let (tx, rx) = mpsc::channel(self.inner.config.stream_buffer_size.max(1) + 1);
        self.inner.pending.insert(tag, tx);
        if self.inner.frame_tx.send(frame).await.is_err() {
            self.inner.pending.remove(&tag);
            return Err(closed());
        }
        Ok((tag, rx))
    }

    /// Sends a request without waiting for its answer
    pub(super) fn request_nowait(
        &self,
        verb: Verb,
    ) {
        let tag = self.inner.next_tag.fetch_add(1, Ordering::Relaxed);
        if let Ok(frame) = protocol::encode(&Request { tag, verb }) {
            let _ = self.inner.frame_tx.try_send(frame);
        }
    }

    pub(super) fn forget(
        &self,
        tag: u32,
    ) {
        self.inner.pending.remove(&tag);
    }

    /// Sends a request and waits for its final response
    async fn call(
        &self,
        verb: Verb,
    ) -> ClientResult<Response> {
        let (tag, mut rx) = self.request(verb).await?;
        match timeout(self.inner.config.request_timeout, rx.recv()).await {
            Ok(Some(response)) => response.into_result(),
            Ok(None) => Err(closed()),
            Err(_) => {
                self.forget(tag);
                Err(ClientError::Unavailable(format!("request {tag} timed out")))
            }
        }
    }

    /// Round trip to the server; returns its applied head revision
    pub async fn noop(&self) -> ClientResult<u64> {
        Ok(self.call(Verb::Noop).await?.rev)
    }

    /// Reads `path` at the head (`snap_id` 0) or in a snapshot of this connection
    pub async fn get(
        &self,
        path: &str,
        snap_id: u32,
    ) -> ClientResult<ReadResult> {
        let response = self
            .call(Verb::Get {
                path: path.to_string(),
                snap_id,
            })
            .await?;
        Ok(ReadResult {
            body: response.body,
            cas: response.cas,
        })
    }

    /// Writes `body` at `path` if its cas satisfies `cas`; returns the new cas
    pub async fn set(
        &self,
        path: &str,
        cas: Cas,
        body: impl Into<Bytes>,
    ) -> ClientResult<Cas> {
        let response = self
            .call(Verb::Set {
                path: path.to_string(),
                cas,
                body: body.into(),
            })
            .await?;
        Ok(response.cas)
    }

    /// Deletes `path` if its cas satisfies `cas`; returns the revision of the delete
    pub async fn del(
        &self,
        path: &str,
        cas: Cas,
    ) -> ClientResult<u64> {
        let response = self
            .call(Verb::Del {
                path: path.to_string(),
                cas,
            })
            .await?;
        Ok(response.rev)
    }

    /// Pins the current head; returns `(snapshot id, revision)`
    pub async fn snap(&self) -> ClientResult<(u32, u64)> {
        let response = self.call(Verb::Snap).await?;
        Ok((response.snap_id, response.rev))
    }

    pub async fn del_snap(
        &self,
        snap_id: u32,
    ) -> ClientResult<()> {
        self.call(Verb::DelSnap { snap_id }).await?;
        Ok(())
    }

    /// Live stream of mutations matching `pattern`
    pub async fn watch(
        &self,
        pattern: &str,
    ) -> ClientResult<EventStream> {
        Glob::compile(pattern)?;
        let (tag, rx) = self
            .request(Verb::Watch {
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(EventStream::new(tag, rx, self.clone()))
    }

    /// One-shot stream of the files matching `pattern` at the head
    pub async fn walk(
        &self,
        pattern: &str,
    ) -> ClientResult<EventStream> {
        Glob::compile(pattern)?;
        let (tag, rx) = self
            .request(Verb::Walk {
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(EventStream::new(tag, rx, self.clone()))
    }

    /// Stops the request tagged `target` on this connection
    pub(super) async fn cancel(
        &self,
        target: u32,
    ) -> ClientResult<()> {
        self.call(Verb::Cancel { target }).await?;
        Ok(())
    }

    /// Asks the server to admit `member` into its cluster
    pub async fn join(
        &self,
        member: Member,
    ) -> ClientResult<JoinTicket> {
        let response = self.call(Verb::Join { member }).await?;
        response
            .join
            .map(|ticket| *ticket)
            .ok_or_else(|| ClientError::Internal("join response without ticket".into()))
    }
}

/// Hands a response to its request without ever waiting on the receiver.
///
/// A stream whose buffer is full gets a final `Unavailable` error and is
/// dropped; its tag is returned so the server side can be cancelled too.
fn route(
    pending: &Pending,
    response: Response,
) -> Option<u32> {
    let tag = response.tag;
    let Some(tx) = pending.get(&tag).map(|entry| entry.value().clone()) else {
        trace!(tag, "response for unknown tag");
        return None;
    };

    if response.is_done() {
        pending.remove(&tag);
        let _ = tx.try_send(response);
        return None;
    }
    if tx.capacity() > 1 {
        let _ = tx.try_send(response);
        return None;
    }

    pending.remove(&tag);
    let overflow = ClientError::Unavailable(format!("stream {tag} overflowed, events were dropped"));
    let _ = tx.try_send(Response::error(tag, &overflow));
    Some(tag)
}
