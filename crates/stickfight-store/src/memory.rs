//! In-process [`RecordStore`] with a push-style change feed.
//!
//! `MemoryStore` is a cloneable handle; every clone addresses the same
//! records. Subscriptions hold their own queue, so a slow consumer never
//! blocks a writer.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::feed::{DeliveryMode, FeedSender, Subscription};
use crate::{Document, RecordStore, Snapshot, StoreError};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, Document>,
    feeds: Vec<(String, FeedSender)>,
    mode: DeliveryMode,
    deny_deletes: bool,
    writes: u64,
}

impl Inner {
    fn notify(&mut self, key: &str) {
        let snapshot: Snapshot = self.records.get(key).cloned();
        self.feeds.retain(|(feed_key, sender)| {
            if feed_key == key {
                sender.send(snapshot.clone())
            } else {
                !sender.is_closed()
            }
        });
    }
}

/// Shared in-memory document store.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use stickfight_store::{document, MemoryStore, RecordStore, StoreError};
///
/// let store = MemoryStore::new();
/// let err = store.update("missing", document(json!({ "x": 1 }))).unwrap_err();
/// assert!(matches!(err, StoreError::NotFound(_)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store delivering every write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delivery mode for subscriptions created afterwards.
    #[must_use]
    pub fn with_delivery(self, mode: DeliveryMode) -> Self {
        self.lock().mode = mode;
        self
    }

    /// Makes every `delete` fail with [`StoreError::PermissionDenied`].
    #[must_use]
    pub fn deny_deletes(self, deny: bool) -> Self {
        self.lock().deny_deletes = deny;
        self
    }

    /// Returns `true` if a record exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().records.contains_key(key)
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Total successful `set`/`update`/`delete` calls.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.lock().records.get(key).cloned())
    }

    fn set(&self, key: &str, doc: Document) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.records.insert(key.to_string(), doc);
        inner.writes += 1;
        trace!(key, "record set");
        inner.notify(key);
        Ok(())
    }

    fn update(&self, key: &str, fields: Document) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let changed: Vec<&str> = fields.keys().map(String::as_str).collect();
        trace!(key, fields = ?changed, "record update");
        for (field, value) in fields {
            record.insert(field, value);
        }
        inner.writes += 1;
        inner.notify(key);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.deny_deletes {
            debug!(key, "delete refused");
            return Err(StoreError::PermissionDenied {
                op: "delete",
                key: key.to_string(),
            });
        }
        if inner.records.remove(key).is_some() {
            inner.writes += 1;
            inner.notify(key);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str) -> Result<Subscription, StoreError> {
        let mut inner = self.lock();
        let (feed, sender) = Subscription::channel(key, inner.mode);
        sender.send(inner.records.get(key).cloned());
        inner.feeds.push((key.to_string(), sender));
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        document(value)
    }

    mod record_tests {
        use super::*;

        #[test]
        fn set_then_get() {
            let store = MemoryStore::new();
            store.set("a", doc(json!({ "x": 1 }))).unwrap();
            assert_eq!(store.get("a").unwrap().unwrap()["x"], 1);
            assert!(store.get("b").unwrap().is_none());
        }

        #[test]
        fn update_merges_top_level_fields() {
            let store = MemoryStore::new();
            store.set("a", doc(json!({ "x": 1, "y": 2 }))).unwrap();
            store.update("a", doc(json!({ "y": 3, "z": 4 }))).unwrap();
            let record = store.get("a").unwrap().unwrap();
            assert_eq!(record["x"], 1);
            assert_eq!(record["y"], 3);
            assert_eq!(record["z"], 4);
        }

        #[test]
        fn update_never_creates() {
            let store = MemoryStore::new();
            assert!(store.update("a", doc(json!({ "x": 1 }))).is_err());
            assert!(!store.contains("a"));
        }

        #[test]
        fn delete_removes_record() {
            let store = MemoryStore::new();
            store.set("a", doc(json!({}))).unwrap();
            store.delete("a").unwrap();
            assert!(store.is_empty());
        }

        #[test]
        fn denied_delete_keeps_record() {
            let store = MemoryStore::new().deny_deletes(true);
            store.set("a", doc(json!({}))).unwrap();
            let err = store.delete("a").unwrap_err();
            assert!(matches!(err, StoreError::PermissionDenied { op: "delete", .. }));
            assert!(store.contains("a"));
        }

        #[test]
        fn clones_share_records() {
            let store = MemoryStore::new();
            let other = store.clone();
            store.set("a", doc(json!({}))).unwrap();
            assert!(other.contains("a"));
            assert_eq!(other.write_count(), 1);
        }
    }

    mod feed_tests {
        use super::*;

        #[test]
        fn subscribe_delivers_current_value() {
            let store = MemoryStore::new();
            store.set("a", doc(json!({ "x": 1 }))).unwrap();
            let feed = store.subscribe("a").unwrap();
            let first = feed.try_next().unwrap().unwrap();
            assert_eq!(first["x"], 1);
            assert!(feed.try_next().is_none());
        }

        #[test]
        fn subscribe_to_missing_record_delivers_none() {
            let store = MemoryStore::new();
            let feed = store.subscribe("a").unwrap();
            assert_eq!(feed.drain(), vec![None]);
        }

        #[test]
        fn every_write_is_delivered_in_order() {
            let store = MemoryStore::new();
            store.set("a", doc(json!({ "n": 0 }))).unwrap();
            let feed = store.subscribe("a").unwrap();
            for n in 1..=3 {
                store.update("a", doc(json!({ "n": n }))).unwrap();
            }
            let values: Vec<i64> = feed
                .drain()
                .into_iter()
                .map(|s| s.unwrap()["n"].as_i64().unwrap())
                .collect();
            assert_eq!(values, vec![0, 1, 2, 3]);
        }

        #[test]
        fn latest_only_coalesces() {
            let store = MemoryStore::new().with_delivery(DeliveryMode::LatestOnly);
            store.set("a", doc(json!({ "n": 0 }))).unwrap();
            let feed = store.subscribe("a").unwrap();
            for n in 1..=3 {
                store.update("a", doc(json!({ "n": n }))).unwrap();
            }
            let snapshots = feed.drain();
            assert_eq!(snapshots.len(), 1);
            assert_eq!(snapshots[0].as_ref().unwrap()["n"], 3);
        }

        #[test]
        fn other_keys_are_not_delivered() {
            let store = MemoryStore::new();
            let feed = store.subscribe("a").unwrap();
            let _ = feed.drain();
            store.set("b", doc(json!({}))).unwrap();
            assert_eq!(feed.pending(), 0);
        }

        #[test]
        fn delete_delivers_none() {
            let store = MemoryStore::new();
            store.set("a", doc(json!({}))).unwrap();
            let feed = store.subscribe("a").unwrap();
            let _ = feed.drain();
            store.delete("a").unwrap();
            assert_eq!(feed.drain(), vec![None]);
        }

        #[test]
        fn dropped_subscription_is_pruned() {
            let store = MemoryStore::new();
            let feed = store.subscribe("a").unwrap();
            drop(feed);
            store.set("a", doc(json!({}))).unwrap();
            assert!(store.lock().feeds.is_empty());
        }
    }

    mod delivery_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn latest_only_always_ends_on_last_write(values in prop::collection::vec(0i64..1000, 1..20)) {
                let store = MemoryStore::new().with_delivery(DeliveryMode::LatestOnly);
                store.set("a", doc(json!({ "n": -1 }))).unwrap();
                let feed = store.subscribe("a").unwrap();
                for n in &values {
                    store.update("a", doc(json!({ "n": n }))).unwrap();
                }
                let snapshots = feed.drain();
                prop_assert_eq!(snapshots.len(), 1);
                prop_assert_eq!(&snapshots[0].as_ref().unwrap()["n"], &json!(values[values.len() - 1]));
            }

            #[test]
            fn every_write_delivers_each_value(values in prop::collection::vec(0i64..1000, 0..20)) {
                let store = MemoryStore::new();
                store.set("a", doc(json!({ "n": -1 }))).unwrap();
                let feed = store.subscribe("a").unwrap();
                for n in &values {
                    store.update("a", doc(json!({ "n": n }))).unwrap();
                }
                prop_assert_eq!(feed.pending(), values.len() + 1);
            }
        }
    }
}
