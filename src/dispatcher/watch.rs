//! Watch subscriptions.
//!
//! Each subscriber owns a bounded queue filled by the dispatcher and a worker
//! task that moves events into the consumer's channel, so a slow consumer
//! only ever stalls its own queue.

use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::Event;
use crate::Glob;
use crate::VersionedStore;
use crate::WatchConfig;

#[derive(Debug)]
struct Subscriber {
    glob: Glob,
    queue: mpsc::Sender<Event>,
    /// Events at or below this revision predate the subscription
    start_rev: AtomicU64,
}

#[derive(Debug)]
pub struct WatchRegistry {
    next_id: AtomicU64,
    subscribers: DashMap<u64, Subscriber>,
    config: WatchConfig,
}

impl WatchRegistry {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: DashMap::new(),
            config,
        }
    }

    /// Registers `glob`; the stream yields every matching mutation applied after this call.
    pub fn subscribe(
        self: &Arc<Self>,
        glob: Glob,
        store: &VersionedStore,
    ) -> WatchStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue_tx, mut queue_rx) = mpsc::channel::<Event>(self.config.subscriber_queue_size.max(1));
        let (consumer_tx, consumer_rx) = mpsc::channel(self.config.consumer_buffer_size.max(1));
        let token = CancellationToken::new();

        debug!(id, pattern = %glob, "watch registered");
        self.subscribers.insert(
            id,
            Subscriber {
                glob,
                queue: queue_tx,
                start_rev: AtomicU64::new(u64::MAX),
            },
        );
        // read after insertion: anything applied later is either delivered or already counted here
        let start = store.revision();
        if let Some(sub) = self.subscribers.get(&id) {
            sub.start_rev.store(start, Ordering::Release);
        }

        let worker_token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = worker_token.cancelled() => break,
                    event = queue_rx.recv() => {
                        let Some(event) = event else { break };
                        tokio::select! {
                            biased;
                            _ = worker_token.cancelled() => break,
                            sent = consumer_tx.send(event) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            trace!(id, "watch worker stopped");
        });

        WatchStream {
            id,
            rx: consumer_rx,
            token,
            registry: self.clone(),
        }
    }

    /// Enqueues `event` for every matching subscriber.
    ///
    /// Waits only on the queues of matching subscribers that are full.
    pub async fn publish(
        &self,
        event: &Event,
    ) {
        let targets: Vec<(u64, mpsc::Sender<Event>)> = self
            .subscribers
            .iter()
            .filter(|s| event.rev > s.start_rev.load(Ordering::Acquire) && s.glob.matches(&event.path))
            .map(|s| (*s.key(), s.queue.clone()))
            .collect();

        for (id, queue) in targets {
            if queue.send(event.clone()).await.is_err() {
                trace!(id, "watch queue closed");
                self.unregister(id);
            }
        }
    }

    pub fn unregister(
        &self,
        id: u64,
    ) {
        if self.subscribers.remove(&id).is_some() {
            debug!(id, "watch unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Consumer end of a watch.
///
/// Dropping it cancels the subscription.
#[derive(Debug)]
pub struct WatchStream {
    id: u64,
    rx: mpsc::Receiver<Event>,
    token: CancellationToken,
    registry: Arc<WatchRegistry>,
}

impl WatchStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event; `None` once cancelled
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Stops the subscription and discards anything buffered
    pub fn cancel(&mut self) {
        self.registry.unregister(self.id);
        self.token.cancel();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        self.token.cancel();
    }
}

impl Stream for WatchStream {
    type Item = Event;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
