//! Events bus: mutations push typed events, flushes publish them in batches.

use std::sync::Mutex;

use afs_types::{NodeEvent, NodeEventList};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Sink for node events.
///
/// Events are queued by [`push_event`](EventsBus::push_event) and delivered
/// to subscribers on [`flush`](EventsBus::flush), one [`NodeEventList`] per
/// run of consecutive events on the same topic.
pub trait EventsBus: Send + Sync {
    fn push_event(&self, event: NodeEvent);

    fn flush(&self);

    fn subscribe(&self) -> broadcast::Receiver<NodeEventList>;
}

/// Events bus fanning batches out over a tokio broadcast channel.
pub struct InMemoryEventsBus {
    pending: Mutex<Vec<NodeEventList>>,
    pending_count: Mutex<usize>,
    flush_threshold: usize,
    sender: broadcast::Sender<NodeEventList>,
}

impl InMemoryEventsBus {
    pub fn new(channel_capacity: usize, flush_threshold: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            pending: Mutex::new(Vec::new()),
            pending_count: Mutex::new(0),
            flush_threshold: flush_threshold.max(1),
            sender,
        }
    }

    /// Deliver an already-batched list immediately, bypassing the queue.
    pub fn publish(&self, list: NodeEventList) {
        if list.is_empty() {
            return;
        }
        trace!(topic = %list.topic, events = list.len(), "publishing event list");
        // An error only means nobody is listening.
        let _ = self.sender.send(list);
    }

    /// Events queued but not yet flushed.
    pub fn pending_len(&self) -> usize {
        *self.pending_count.lock().expect("events lock poisoned")
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventsBus {
    fn default() -> Self {
        Self::new(1024, 1000)
    }
}

impl EventsBus for InMemoryEventsBus {
    fn push_event(&self, event: NodeEvent) {
        let full = {
            let mut pending = self.pending.lock().expect("events lock poisoned");
            let topic = event.topic();
            match pending.last_mut() {
                Some(list) if list.topic == topic => list.events.push(event),
                _ => pending.push(NodeEventList::new(topic, vec![event])),
            }
            let mut count = self.pending_count.lock().expect("events lock poisoned");
            *count += 1;
            *count >= self.flush_threshold
        };
        if full {
            self.flush();
        }
    }

    fn flush(&self) {
        let lists = {
            let mut pending = self.pending.lock().expect("events lock poisoned");
            *self.pending_count.lock().expect("events lock poisoned") = 0;
            std::mem::take(&mut *pending)
        };
        if lists.is_empty() {
            return;
        }
        debug!(batches = lists.len(), "flushing events");
        for list in lists {
            self.publish(list);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<NodeEventList> {
        self.sender.subscribe()
    }
}
