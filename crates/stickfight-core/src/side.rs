//! Per-side combat state.
//!
//! A duel has exactly two sides. The host is always the authority and the
//! guest is always the observer; [`Side`] names the seat, independent of
//! which process is looking at it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rules::{ActionId, BuffId};

/// One of the two seats in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The party that created the session.
    Host,
    /// The party that joined it.
    Guest,
}

impl Side {
    /// The other seat.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }

    /// Lowercase name, as used in logs and wire messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remaining-turn counters keyed by id.
///
/// Every stored value is greater than zero; an absent key means "not
/// active". Used for both cooldowns and buffs.
///
/// # Example
///
/// ```
/// use stickfight_core::side::Cooldowns;
/// use stickfight_core::rules::ActionId;
///
/// let mut cooldowns = Cooldowns::default();
/// cooldowns.set(ActionId::new("heavy"), 2);
/// cooldowns.tick();
/// assert_eq!(cooldowns.remaining(&ActionId::new("heavy")), 1);
/// cooldowns.tick();
/// assert!(cooldowns.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timers<K: Ord>(BTreeMap<K, u32>);

impl<K: Ord> Default for Timers<K> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord + Clone> Timers<K> {
    /// Starts or restarts a counter. A zero value removes the key.
    pub fn set(&mut self, key: K, turns: u32) {
        if turns == 0 {
            self.0.remove(&key);
        } else {
            self.0.insert(key, turns);
        }
    }

    /// Turns left for `key` (0 when inactive).
    #[must_use]
    pub fn remaining(&self, key: &K) -> u32 {
        self.0.get(key).copied().unwrap_or(0)
    }

    /// Returns `true` if `key` has turns left.
    #[must_use]
    pub fn is_active(&self, key: &K) -> bool {
        self.0.contains_key(key)
    }

    /// Decrements every counter by one and drops the ones that reach zero.
    pub fn tick(&mut self) {
        self.0.retain(|_, turns| {
            *turns = turns.saturating_sub(1);
            *turns > 0
        });
    }

    /// Active entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u32)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when nothing is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every counter.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Removes zero entries that may arrive from an untrusted document.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.0.retain(|_, turns| *turns > 0);
        self
    }
}

impl<K: Ord + Clone> FromIterator<(K, u32)> for Timers<K> {
    fn from_iter<I: IntoIterator<Item = (K, u32)>>(iter: I) -> Self {
        let mut timers = Self::default();
        for (key, turns) in iter {
            timers.set(key, turns);
        }
        timers
    }
}

/// Action cooldowns of one side.
pub type Cooldowns = Timers<ActionId>;

/// Active buffs of one side.
pub type Buffs = Timers<BuffId>;

/// Everything the resolver needs to know about one side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SideState {
    /// Current HP.
    pub hp: i32,
    /// Action cooldowns.
    pub cooldowns: Cooldowns,
    /// Active buffs.
    pub buffs: Buffs,
}

impl SideState {
    /// A fresh side at `hp` with nothing active.
    #[must_use]
    pub fn fresh(hp: i32) -> Self {
        Self {
            hp,
            cooldowns: Cooldowns::default(),
            buffs: Buffs::default(),
        }
    }
}

/// A value held once per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerSide<T> {
    /// The host's value.
    pub host: T,
    /// The guest's value.
    pub guest: T,
}

impl<T> PerSide<T> {
    /// Builds a pair.
    pub const fn new(host: T, guest: T) -> Self {
        Self { host, guest }
    }

    /// The value for `side`.
    pub const fn get(&self, side: Side) -> &T {
        match side {
            Side::Host => &self.host,
            Side::Guest => &self.guest,
        }
    }

    /// Mutable access to the value for `side`.
    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Host => &mut self.host,
            Side::Guest => &mut self.guest,
        }
    }
}
