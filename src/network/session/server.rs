//! TCP server for client sessions.
//!
//! One task accepts connections. Each connection gets a reader loop, a writer
//! task draining its response channel, and one task per in-flight request.
//! Closing the connection cancels every request it still runs and drops its
//! [`Session`], releasing the session's snapshots.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::protocol;
use super::protocol::Request;
use super::protocol::Response;
use super::protocol::Verb;
use crate::node::Services;
use crate::ClientError;
use crate::Result;
use crate::Session;

type Inflight = Arc<DashMap<u32, CancellationToken>>;

/// Accepts client connections until shutdown
pub(crate) struct SessionServer {
    listener: TcpListener,
    services: Services,
    shutdown_signal: watch::Receiver<()>,
}

impl SessionServer {
    pub(crate) fn new(
        listener: TcpListener,
        services: Services,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            services,
            shutdown_signal,
        }
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "session server listening");
        loop {
            tokio::select! {
                biased;
                // P0: shutdown received;
                _ = self.shutdown_signal.changed() => {
                    info!("session server shutdown signal received");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "client connected");
                            let connection = Connection {
                                session: Arc::new(Session::new(self.services.clone())),
                                max_frame_length: self.services.settings.network.max_frame_length,
                                response_buffer_size: self.services.settings.network.response_buffer_size,
                                shutdown_signal: self.shutdown_signal.clone(),
                            };
                            tokio::spawn(connection.serve(stream, peer));
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
    }
}

struct Connection {
    session: Arc<Session>,
    max_frame_length: usize,
    response_buffer_size: usize,
    shutdown_signal: watch::Receiver<()>,
}

impl Connection {
    async fn serve(
        mut self,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let framed = Framed::new(stream, protocol::codec(self.max_frame_length));
        let (mut sink, mut frames) = framed.split();
        let (resp_tx, resp_rx) = mpsc::channel::<Response>(self.response_buffer_size);

        let writer = tokio::spawn(async move {
            let mut responses = ReceiverStream::new(resp_rx);
            while let Some(response) = responses.next().await {
                let frame = match protocol::encode(&response) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(tag = response.tag, error = %e, "response encoding failed");
                        continue;
                    }
                };
                if let Err(e) = sink.send(frame).await {
                    debug!(%peer, error = %e, "client write failed");
                    break;
                }
            }
        });

        let inflight: Inflight = Arc::new(DashMap::new());
        let connection_token = CancellationToken::new();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_signal.changed() => {
                    break;
                }
                frame = frames.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            warn!(%peer, error = %e, "malformed frame, closing connection");
                            break;
                        }
                        None => break,
                    };
                    let request = match protocol::decode::<Request>(&frame) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(%peer, error = %e, "undecodable request");
                            let _ = resp_tx.send(Response::unknown_verb(e.to_string())).await;
                            continue;
                        }
                    };
                    trace!(%peer, tag = request.tag, verb = ?request.verb, "request");

                    if let Verb::Cancel { target } = request.verb {
                        if let Some((_, token)) = inflight.remove(&target) {
                            token.cancel();
                        }
                        let _ = resp_tx.send(Response::done(request.tag)).await;
                        continue;
                    }

                    let token = connection_token.child_token();
                    inflight.insert(request.tag, token.clone());
                    tokio::spawn(handle_request(
                        self.session.clone(),
                        request,
                        resp_tx.clone(),
                        token,
                        inflight.clone(),
                    ));
                }
            }
        }

        debug!(%peer, inflight = inflight.len(), "client disconnected");
        connection_token.cancel();
        drop(resp_tx);
        let _ = writer.await;
    }
}

async fn handle_request(
    session: Arc<Session>,
    request: Request,
    resp_tx: mpsc::Sender<Response>,
    token: CancellationToken,
    inflight: Inflight,
) {
    let tag = request.tag;
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!(tag, "request cancelled");
            // closes the cancelled stream on the client side
            let _ = resp_tx.try_send(Response::done(tag));
        }
        response = execute(&session, tag, request.verb, &resp_tx) => {
            let response = response.unwrap_or_else(|e| Response::error(tag, &e));
            let _ = resp_tx.send(response).await;
        }
    }
    inflight.remove(&tag);
}

/// Runs one verb; streamed events are sent as they come and the final
/// response is returned.
async fn execute(
    session: &Session,
    tag: u32,
    verb: Verb,
    resp_tx: &mpsc::Sender<Response>,
) -> std::result::Result<Response, ClientError> {
    let closed = || ClientError::Unavailable("connection closed".into());

    let response = match verb {
        Verb::Noop => Response {
            rev: session.noop(),
            ..Response::valid(tag)
        },
        Verb::Get { path, snap_id } => Response::read(tag, session.get(&path, snap_id).await?),
        Verb::Set { path, cas, body } => Response {
            cas: session.set(&path, cas, body).await?,
            ..Response::valid(tag)
        },
        Verb::Del { path, cas } => Response {
            rev: session.del(&path, cas).await?,
            ..Response::valid(tag)
        },
        Verb::Snap => {
            let (snap_id, rev) = session.snap().await?;
            Response {
                snap_id,
                rev,
                ..Response::valid(tag)
            }
        }
        Verb::DelSnap { snap_id } => {
            session.del_snap(snap_id)?;
            Response::done(tag)
        }
        Verb::Watch { pattern } => {
            let mut stream = session.watch(&pattern)?;
            while let Some(event) = stream.recv().await {
                resp_tx.send(Response::event(tag, event)).await.map_err(|_| closed())?;
            }
            Response::done(tag)
        }
        Verb::Walk { pattern } => {
            for event in session.walk(&pattern).await? {
                resp_tx.send(Response::event(tag, event)).await.map_err(|_| closed())?;
            }
            Response::done(tag)
        }
        Verb::Join { member } => {
            let ticket = session.join(member).await?;
            Response {
                rev: ticket.revision,
                join: Some(Box::new(ticket)),
                ..Response::valid(tag)
            }
        }
        Verb::Cancel { .. } => Response::done(tag),
    };
    Ok(response)
}
