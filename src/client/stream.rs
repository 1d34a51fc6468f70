use tokio::sync::mpsc;

use super::Client;
use crate::network::session::protocol::Response;
use crate::network::session::protocol::Verb;
use crate::ClientError;
use crate::Event;

/// Events of a `watch` or `walk` request.
///
/// Dropping an unfinished stream cancels it on the server.
#[derive(Debug)]
pub struct EventStream {
    tag: u32,
    rx: mpsc::Receiver<Response>,
    client: Client,
    finished: bool,
}

impl EventStream {
    pub(super) fn new(
        tag: u32,
        rx: mpsc::Receiver<Response>,
        client: Client,
    ) -> Self {
        Self {
            tag,
            rx,
            client,
            finished: false,
        }
    }

    /// Next event; `None` once the stream is complete or cancelled.
    pub async fn recv(&mut self) -> Option<Result<Event, ClientError>> {
        if self.finished {
            return None;
        }
        let Some(response) = self.rx.recv().await else {
            self.finished = true;
            return Some(Err(ClientError::Unavailable("connection closed".into())));
        };
        if response.is_done() {
            self.finished = true;
        }
        match response.into_result() {
            Err(e) => Some(Err(e)),
            Ok(response) if response.is_valid() => Some(Ok(response.to_event())),
            Ok(_) => None,
        }
    }

    /// Collects the remaining events; ends with the stream's first error
    pub async fn collect(mut self) -> Result<Vec<Event>, ClientError> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event?);
        }
        Ok(events)
    }

    /// Stops the stream on the server. Unread events are discarded.
    pub async fn cancel(&mut self) -> Result<(), ClientError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.client.forget(self.tag);
        self.rx.close();
        self.client.cancel(self.tag).await
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.finished {
            self.client.forget(self.tag);
            self.client.request_nowait(Verb::Cancel { target: self.tag });
        }
    }
}
