//! # Stickfight Store
//!
//! Shared-record substrate for Stickfight sessions.
//!
//! Two peers never talk to each other directly in hosted play. Both read one
//! shared document, each writes only the fields it owns, and both learn about
//! changes through a push-style feed. This crate provides that substrate:
//!
//! - **[`RecordStore`]**: create, read, field-level update, delete and
//!   subscribe on JSON documents addressed by string keys
//! - **[`MemoryStore`]**: an in-process implementation with a configurable
//!   delivery model (every write, or coalesced latest value)
//! - **[`BroadcastHub`]**: a same-machine message bus for play without a
//!   shared store
//! - **[`Subscription`]**: a per-subscriber queue; other stores fill one
//!   through the [`FeedSender`] returned by [`Subscription::channel`]
//! - **[`Clock`]**: millisecond time source for write timestamps
//!
//! ## Delivery Model
//!
//! A subscription delivers the full current document on subscribe and after
//! every change. Consumers must not assume they see every intermediate value:
//! under [`DeliveryMode::LatestOnly`] several writes between two drains
//! collapse into one snapshot.
//!
//! ## Quick Start
//!
//! ```
//! use serde_json::json;
//! use stickfight_store::{document, MemoryStore, RecordStore};
//!
//! let store = MemoryStore::new();
//! store.set("room", document(json!({ "state": "matchmaking" }))).unwrap();
//!
//! let feed = store.subscribe("room").unwrap();
//! store.update("room", document(json!({ "state": "playing" }))).unwrap();
//!
//! let snapshots = feed.drain();
//! assert_eq!(snapshots.len(), 2);
//! assert_eq!(snapshots[1].as_ref().unwrap()["state"], "playing");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod broadcast;
pub mod clock;
pub mod feed;
pub mod memory;

pub use broadcast::{BroadcastHub, BroadcastPort};
pub use clock::{Clock, ManualClock, SystemClock};
pub use feed::{DeliveryMode, FeedSender, Subscription};
pub use memory::MemoryStore;

use serde_json::{Map, Value};
use thiserror::Error;

/// A stored record: a JSON object keyed by top-level field name.
pub type Document = Map<String, Value>;

/// One delivery from a subscription. `None` means the record does not exist.
pub type Snapshot = Option<Document>;

/// Converts a JSON value into a [`Document`].
///
/// Non-object values produce an empty document.
#[must_use]
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Errors reported by a [`RecordStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The store refused the operation.
    #[error("permission denied: {op} on {key}")]
    PermissionDenied {
        /// The refused operation.
        op: &'static str,
        /// The record key.
        key: String,
    },

    /// The store is unreachable or failed internally.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A document store with per-record change notification.
///
/// Implementations must deliver, for every subscription, the complete
/// current record after each change. Ordering is per record; delivery of
/// intermediate values is not guaranteed.
///
/// # Invariants
///
/// - `update` merges top-level fields in a single step: a subscriber never
///   observes part of one update applied
/// - `update` on a missing record fails with [`StoreError::NotFound`] and
///   does not create it
pub trait RecordStore: Send + Sync {
    /// Reads a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<Document>, StoreError>;

    /// Creates or overwrites a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn set(&self, key: &str, doc: Document) -> Result<(), StoreError>;

    /// Merges `fields` into an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record is absent.
    fn update(&self, key: &str, fields: Document) -> Result<(), StoreError>;

    /// Removes a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PermissionDenied`] if deletion is not allowed.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Subscribes to a record's change feed.
    ///
    /// The current value is queued immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot register the subscription.
    fn subscribe(&self, key: &str) -> Result<Subscription, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_from_object() {
        let doc = document(json!({ "a": 1 }));
        assert_eq!(doc.get("a"), Some(&json!(1)));
    }

    #[test]
    fn document_from_non_object_is_empty() {
        assert!(document(json!([1, 2])).is_empty());
        assert!(document(Value::Null).is_empty());
    }

    #[test]
    fn error_display() {
        let err = StoreError::PermissionDenied {
            op: "delete",
            key: "stickfight_room-1".to_string(),
        };
        assert_eq!(err.to_string(), "permission denied: delete on stickfight_room-1");
    }
}
