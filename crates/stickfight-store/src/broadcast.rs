//! Same-machine message bus.
//!
//! Mirrors a browser `BroadcastChannel`: ports opened on the same channel
//! name receive each other's messages, never their own. Messages are plain
//! JSON values; decoding is the receiver's business.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::trace;

#[derive(Debug, Default)]
struct PortQueue {
    items: Mutex<VecDeque<Value>>,
}

impl PortQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Value>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct HubInner {
    next_port: u64,
    ports: Vec<(String, u64, Weak<PortQueue>)>,
}

/// Registry of open broadcast ports. Clones share the same bus.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use stickfight_store::BroadcastHub;
///
/// let hub = BroadcastHub::new();
/// let host = hub.open("stickfight:room-1");
/// let guest = hub.open("stickfight:room-1");
///
/// guest.post(&json!({ "type": "join" }));
/// assert_eq!(host.drain().len(), 1);
/// assert!(guest.drain().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<Mutex<HubInner>>,
}

impl BroadcastHub {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a port on `channel`.
    #[must_use]
    pub fn open(&self, channel: &str) -> BroadcastPort {
        let mut inner = self.lock();
        let id = inner.next_port;
        inner.next_port += 1;
        let queue = Arc::new(PortQueue::default());
        inner
            .ports
            .push((channel.to_string(), id, Arc::downgrade(&queue)));
        BroadcastPort {
            hub: self.clone(),
            channel: channel.to_string(),
            id,
            queue,
        }
    }

    /// Number of open ports on `channel`.
    #[must_use]
    pub fn port_count(&self, channel: &str) -> usize {
        self.lock()
            .ports
            .iter()
            .filter(|(name, _, queue)| name == channel && queue.strong_count() > 0)
            .count()
    }

    fn deliver(&self, channel: &str, sender: u64, message: &Value) -> usize {
        let mut inner = self.lock();
        inner.ports.retain(|(_, _, queue)| queue.strong_count() > 0);
        let mut delivered = 0;
        for (name, id, queue) in &inner.ports {
            if name != channel || *id == sender {
                continue;
            }
            if let Some(queue) = queue.upgrade() {
                queue.lock().push_back(message.clone());
                delivered += 1;
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One endpoint on a broadcast channel. Dropping it closes the port.
#[derive(Debug)]
pub struct BroadcastPort {
    hub: BroadcastHub,
    channel: String,
    id: u64,
    queue: Arc<PortQueue>,
}

impl BroadcastPort {
    /// The channel name this port is attached to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Sends `message` to every other port on the channel.
    ///
    /// Returns the number of receiving ports.
    pub fn post(&self, message: &Value) -> usize {
        let delivered = self.hub.deliver(&self.channel, self.id, message);
        trace!(channel = %self.channel, delivered, "broadcast");
        delivered
    }

    /// Takes every received message in arrival order.
    #[must_use]
    pub fn drain(&self) -> Vec<Value> {
        self.queue.lock().drain(..).collect()
    }
}
