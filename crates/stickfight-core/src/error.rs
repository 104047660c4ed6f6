//! Error types for session operations.

use stickfight_store::StoreError;
use thiserror::Error;

use crate::rules::{ActionId, RulesError};

/// Errors surfaced to the application by session operations.
///
/// Expected races (a duplicate submission, an action still cooling down)
/// are not errors; see [`Submission::Rejected`](crate::session::Submission).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The shared-record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The ruleset is invalid.
    #[error(transparent)]
    Rules(#[from] RulesError),

    /// A stored record could not be decoded.
    #[error("malformed session record {key}: {source}")]
    Malformed {
        /// Record key.
        key: String,
        /// Decode error.
        source: serde_json::Error,
    },

    /// Every deterministic and random candidate identifier was taken.
    #[error("no free session id for {requested} after {attempts} attempts")]
    AllocationExhausted {
        /// The requested room name.
        requested: String,
        /// Total candidates tried.
        attempts: usize,
    },

    /// The guest seat is held by someone else.
    #[error("session {room} already has a guest ({guest})")]
    SessionFull {
        /// Room code.
        room: String,
        /// Seated guest name.
        guest: String,
    },

    /// The action is not in the ruleset.
    #[error("unknown action {0}")]
    UnknownAction(ActionId),

    /// The operation is reserved for the authority.
    #[error("{0} is an authority-only operation")]
    NotAuthority(&'static str),

    /// Another host reclaimed the room after this participant attached.
    #[error("session {0} now belongs to another host")]
    Replaced(String),

    /// The participant has already left or ended the session.
    #[error("participant is detached from session {0}")]
    Detached(String),
}
