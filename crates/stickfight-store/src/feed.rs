//! Change-feed queues shared by every [`RecordStore`](crate::RecordStore).
//!
//! A store creates a feed with [`Subscription::channel`], keeps the
//! [`FeedSender`] half, and hands the [`Subscription`] to the caller. The
//! sender holds only a weak handle: once the subscription is dropped,
//! [`FeedSender::send`] returns `false` and the store may forget it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::Snapshot;

/// How a subscription queues snapshots between drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Queue one snapshot per write.
    #[default]
    EveryWrite,
    /// Keep only the latest snapshot. Intermediate values are lost.
    LatestOnly,
}

#[derive(Debug)]
struct FeedQueue {
    mode: DeliveryMode,
    items: Mutex<VecDeque<Snapshot>>,
}

impl FeedQueue {
    fn items(&self) -> MutexGuard<'_, VecDeque<Snapshot>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, snapshot: Snapshot) {
        let mut items = self.items();
        if self.mode == DeliveryMode::LatestOnly {
            items.clear();
        }
        items.push_back(snapshot);
    }
}

/// Store-side half of a change feed.
#[derive(Debug, Clone)]
pub struct FeedSender {
    queue: Weak<FeedQueue>,
}

impl FeedSender {
    /// Queues `snapshot` for the subscriber.
    ///
    /// Returns `false` if the subscription has been dropped.
    pub fn send(&self, snapshot: Snapshot) -> bool {
        match self.queue.upgrade() {
            Some(queue) => {
                queue.push(snapshot);
                true
            }
            None => false,
        }
    }

    /// Returns `true` once the subscription has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.strong_count() == 0
    }
}

/// A live change feed for one record.
///
/// Dropping the subscription detaches it from the store.
#[derive(Debug)]
pub struct Subscription {
    key: String,
    queue: Arc<FeedQueue>,
}

impl Subscription {
    /// Creates an empty feed for `key` and the sender a store keeps to fill it.
    #[must_use]
    pub fn channel(key: &str, mode: DeliveryMode) -> (Self, FeedSender) {
        let queue = Arc::new(FeedQueue {
            mode,
            items: Mutex::new(VecDeque::new()),
        });
        let sender = FeedSender {
            queue: Arc::downgrade(&queue),
        };
        (
            Self {
                key: key.to_string(),
                queue,
            },
            sender,
        )
    }

    /// The subscribed record key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Takes the oldest queued snapshot, if any.
    ///
    /// The outer `Option` is `None` when nothing is queued; the inner one is
    /// `None` when the record was absent at delivery time.
    #[must_use]
    pub fn try_next(&self) -> Option<Snapshot> {
        self.queue.items().pop_front()
    }

    /// Takes every queued snapshot in delivery order.
    #[must_use]
    pub fn drain(&self) -> Vec<Snapshot> {
        self.queue.items().drain(..).collect()
    }

    /// Number of queued snapshots.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.items().len()
    }
}
