use tokio::sync::broadcast;
use tracing::trace;

use crate::dto::sse::ServerEvent;

/// Fan-out of public events to every connected SSE client.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Hub buffering at most `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of clients currently listening.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish `event`; it is dropped when nobody listens.
    pub fn broadcast(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            trace!("no SSE subscribers; event dropped");
        }
    }
}
