//! Session id allocation.
//!
//! A host asks for a room name; the registry hands back the first free
//! variant of it. Candidates are tried in order:
//!
//! 1. the requested name itself
//! 2. `name-2` through `name-N` (N is [`SessionConfig::max_suffix_attempts`])
//! 3. a bounded number of `name-xxxxx` candidates with a random base-36
//!    suffix
//!
//! A candidate is free when no record exists under its key, or when the
//! record there is in `gameover` (it is reclaimed). A record that cannot be
//! decoded counts as taken.
//!
//! Probing and the later record write are separate store calls. Two hosts
//! racing for the same name can both see it free; the second write wins.
//! Callers that need stronger guarantees want a store with
//! create-if-absent semantics.

use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use stickfight_store::RecordStore;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;

use super::record::{SessionRecord, SessionState};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A room code identifying one session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new id.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Result of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// The id that was granted.
    pub session_id: SessionId,
    /// The name the caller asked for, after defaulting.
    pub requested: String,
    /// A finished session was overwritten.
    pub reclaimed: bool,
    /// The id came from the random fallback.
    pub randomized: bool,
}

impl Allocation {
    /// Returns `true` if the caller did not get the name they asked for.
    #[must_use]
    pub fn renamed(&self) -> bool {
        self.session_id.as_str() != self.requested
    }
}

/// What the registry found under a candidate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Free,
    Finished,
    Taken,
}

/// Finds free session ids in a [`RecordStore`].
#[derive(Debug)]
pub struct SessionRegistry<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    config: &'a SessionConfig,
}

impl<'a, S: RecordStore + ?Sized> SessionRegistry<'a, S> {
    /// Creates a registry over `store`.
    #[must_use]
    pub const fn new(store: &'a S, config: &'a SessionConfig) -> Self {
        Self { store, config }
    }

    /// Allocates an id for `requested`.
    ///
    /// A blank request falls back to the configured default room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AllocationExhausted`] if every candidate is
    /// taken, or [`SessionError::Store`] if the store cannot be read.
    pub fn allocate<R: RngCore + ?Sized>(
        &self,
        requested: &str,
        rng: &mut R,
    ) -> Result<Allocation, SessionError> {
        let base = match requested.trim() {
            "" => self.config.default_room.clone(),
            name => name.to_string(),
        };

        let deterministic = self.config.max_suffix_attempts.max(1);
        for index in 0..deterministic {
            let candidate = if index == 0 {
                base.clone()
            } else {
                format!("{base}-{}", index + 1)
            };
            if let Some(allocation) = self.try_claim(&base, &candidate, false)? {
                return Ok(allocation);
            }
        }

        warn!(
            requested = %base,
            attempts = deterministic,
            "deterministic session ids exhausted, trying random suffixes"
        );
        for _ in 0..self.config.random_fallback_attempts {
            let candidate = format!("{base}-{}", random_suffix(self.config.random_suffix_len, rng));
            if let Some(allocation) = self.try_claim(&base, &candidate, true)? {
                return Ok(allocation);
            }
        }

        Err(SessionError::AllocationExhausted {
            requested: base,
            attempts: deterministic + self.config.random_fallback_attempts,
        })
    }

    fn try_claim(
        &self,
        base: &str,
        candidate: &str,
        randomized: bool,
    ) -> Result<Option<Allocation>, SessionError> {
        let slot = self.inspect(candidate)?;
        if slot == Slot::Taken {
            return Ok(None);
        }
        debug!(candidate, reclaimed = slot == Slot::Finished, "session id allocated");
        Ok(Some(Allocation {
            session_id: SessionId::new(candidate),
            requested: base.to_string(),
            reclaimed: slot == Slot::Finished,
            randomized,
        }))
    }

    fn inspect(&self, candidate: &str) -> Result<Slot, SessionError> {
        let key = self.config.record_key(candidate);
        let Some(doc) = self.store.get(&key)? else {
            return Ok(Slot::Free);
        };
        match SessionRecord::from_document(doc) {
            Ok(record) if record.state == SessionState::Gameover => Ok(Slot::Finished),
            Ok(_) => Ok(Slot::Taken),
            Err(err) => {
                debug!(key, error = %err, "undecodable record treated as taken");
                Ok(Slot::Taken)
            }
        }
    }
}

fn random_suffix<R: RngCore + ?Sized>(len: usize, rng: &mut R) -> String {
    (0..len.max(1))
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect()
}
