//! The shared session record.
//!
//! One [`SessionRecord`] per match is the single source of truth both peers
//! read. It is stored as a camelCase JSON document; field names are part of
//! the wire contract between peers.
//!
//! # Invariants
//!
//! - `hostHP`/`guestHP` are within `[0, max_hp]` in every stored state
//! - only the authority writes HP, `turn`, cooldowns, buffs and
//!   `lastResolvedMark`
//! - each side writes only its own action field
//! - a resolution clears both action fields in the same write that updates
//!   HP, timers, `turn` and `lastResolvedMark`
//! - `turn` starts at 1 and grows by exactly 1 per resolution
//! - `lastResolvedMark` strictly increases across resolutions, including
//!   across resets

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use stickfight_store::Document;

use crate::rules::ActionId;
use crate::side::{Buffs, Cooldowns, PerSide, Side, SideState};

/// Lifecycle of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for the guest, or for the authority to promote.
    #[default]
    Matchmaking,
    /// Both seats filled; turns are being played.
    Playing,
    /// Finished or abandoned. Terminal until reset.
    Gameover,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Matchmaking => "matchmaking",
            Self::Playing => "playing",
            Self::Gameover => "gameover",
        })
    }
}

/// An action field: empty, or one submitted action.
///
/// Serialized as a plain string with `""` for empty, so a document written
/// by any client reads the same way.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionSlot(Option<ActionId>);

impl ActionSlot {
    /// The empty slot.
    pub const EMPTY: Self = Self(None);

    /// A filled slot.
    #[must_use]
    pub fn filled(action: ActionId) -> Self {
        Self(Some(action))
    }

    /// The held action, if any.
    #[must_use]
    pub fn get(&self) -> Option<&ActionId> {
        self.0.as_ref()
    }

    /// Returns `true` when nothing is submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl From<Option<ActionId>> for ActionSlot {
    fn from(action: Option<ActionId>) -> Self {
        Self(action)
    }
}

impl Serialize for ActionSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_ref().map_or("", ActionId::as_str))
    }
}

impl<'de> Deserialize<'de> for ActionSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw {
            Some(s) if !s.is_empty() => Self(Some(ActionId::from(s))),
            _ => Self(None),
        })
    }
}

/// Change-detection token written by the authority at each resolution.
///
/// Zero means "nothing resolved yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResolutionMark(u64);

impl ResolutionMark {
    /// The unset mark.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` once any resolution has been marked.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }

    /// The mark for a new resolution: the current time in milliseconds, or
    /// one past the previous mark if the clock has not moved past it.
    #[must_use]
    pub fn next_after(previous: Self, now_ms: u64) -> Self {
        Self(now_ms.max(previous.0.saturating_add(1)))
    }
}

impl fmt::Display for ResolutionMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn first_turn() -> u32 {
    1
}

/// The shared per-match record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Lifecycle state.
    pub state: SessionState,
    /// Host display name.
    #[serde(default)]
    pub host_name: String,
    /// Identifies one hosting of this key. A host that reclaims a finished
    /// room writes a new token, so the previous host can tell the record is
    /// no longer its own. Empty on records written without one.
    #[serde(default)]
    pub host_token: String,
    /// Guest display name; empty until a guest joins.
    #[serde(default)]
    pub guest_name: String,
    /// Host HP.
    #[serde(rename = "hostHP")]
    pub host_hp: i32,
    /// Guest HP.
    #[serde(rename = "guestHP")]
    pub guest_hp: i32,
    /// Host's pending action for the current turn.
    #[serde(default)]
    pub host_action: ActionSlot,
    /// Guest's pending action for the current turn.
    #[serde(default)]
    pub guest_action: ActionSlot,
    /// Host cooldowns.
    #[serde(default)]
    pub host_cooldowns: Cooldowns,
    /// Guest cooldowns.
    #[serde(default)]
    pub guest_cooldowns: Cooldowns,
    /// Host buffs.
    #[serde(default)]
    pub host_buffs: Buffs,
    /// Guest buffs.
    #[serde(default)]
    pub guest_buffs: Buffs,
    /// Current turn number, starting at 1.
    #[serde(default = "first_turn")]
    pub turn: u32,
    /// Host action resolved in the most recent turn.
    #[serde(default)]
    pub last_host_action: ActionSlot,
    /// Guest action resolved in the most recent turn.
    #[serde(default)]
    pub last_guest_action: ActionSlot,
    /// Token of the most recent resolution.
    #[serde(default)]
    pub last_resolved_mark: ResolutionMark,
    /// Last write time in milliseconds. Informational only.
    #[serde(default)]
    pub updated_at: u64,
}

impl SessionRecord {
    /// A fresh record in `matchmaking` with both sides at `starting_hp`.
    #[must_use]
    pub fn new(host_name: &str, starting_hp: i32, now_ms: u64) -> Self {
        Self {
            state: SessionState::Matchmaking,
            host_name: host_name.to_string(),
            host_token: String::new(),
            guest_name: String::new(),
            host_hp: starting_hp,
            guest_hp: starting_hp,
            host_action: ActionSlot::EMPTY,
            guest_action: ActionSlot::EMPTY,
            host_cooldowns: Cooldowns::default(),
            guest_cooldowns: Cooldowns::default(),
            host_buffs: Buffs::default(),
            guest_buffs: Buffs::default(),
            turn: first_turn(),
            last_host_action: ActionSlot::EMPTY,
            last_guest_action: ActionSlot::EMPTY,
            last_resolved_mark: ResolutionMark::ZERO,
            updated_at: now_ms,
        }
    }

    /// Stamps the record with the hosting token of its creator.
    #[must_use]
    pub fn with_host_token(mut self, token: &str) -> Self {
        self.host_token = token.to_string();
        self
    }

    /// Returns `true` if the record belongs to the hosting identified by
    /// `token`.
    #[must_use]
    pub fn is_hosted_by(&self, token: &str) -> bool {
        self.host_token == token
    }

    /// Decodes a stored document.
    ///
    /// Zero-valued timer entries are dropped.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if required fields are missing or mistyped.
    pub fn from_document(doc: Document) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(serde_json::Value::Object(doc))?;
        record.host_cooldowns = record.host_cooldowns.normalized();
        record.guest_cooldowns = record.guest_cooldowns.normalized();
        record.host_buffs = record.host_buffs.normalized();
        record.guest_buffs = record.guest_buffs.normalized();
        Ok(record)
    }

    /// Encodes the record as a document.
    ///
    /// # Errors
    ///
    /// Serialization of this type cannot fail in practice; the error is
    /// propagated rather than unwrapped.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(Document::new()),
        }
    }

    /// Applies a field-level patch the way the store would.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the merged document no longer decodes.
    pub fn merged(&self, fields: Document) -> Result<Self, serde_json::Error> {
        let mut doc = self.to_document()?;
        for (field, value) in fields {
            doc.insert(field, value);
        }
        Self::from_document(doc)
    }

    /// Display name for `side`.
    #[must_use]
    pub fn name(&self, side: Side) -> &str {
        match side {
            Side::Host => &self.host_name,
            Side::Guest => &self.guest_name,
        }
    }

    /// HP of `side`.
    #[must_use]
    pub const fn hp(&self, side: Side) -> i32 {
        match side {
            Side::Host => self.host_hp,
            Side::Guest => self.guest_hp,
        }
    }

    /// Both HP values.
    #[must_use]
    pub const fn hp_pair(&self) -> PerSide<i32> {
        PerSide::new(self.host_hp, self.guest_hp)
    }

    /// Pending action of `side`.
    #[must_use]
    pub fn action(&self, side: Side) -> Option<&ActionId> {
        match side {
            Side::Host => self.host_action.get(),
            Side::Guest => self.guest_action.get(),
        }
    }

    /// Action `side` resolved in the most recent turn.
    #[must_use]
    pub fn last_action(&self, side: Side) -> Option<&ActionId> {
        match side {
            Side::Host => self.last_host_action.get(),
            Side::Guest => self.last_guest_action.get(),
        }
    }

    /// Cooldowns of `side`.
    #[must_use]
    pub const fn cooldowns(&self, side: Side) -> &Cooldowns {
        match side {
            Side::Host => &self.host_cooldowns,
            Side::Guest => &self.guest_cooldowns,
        }
    }

    /// Buffs of `side`.
    #[must_use]
    pub const fn buffs(&self, side: Side) -> &Buffs {
        match side {
            Side::Host => &self.host_buffs,
            Side::Guest => &self.guest_buffs,
        }
    }

    /// Resolver view of `side`.
    #[must_use]
    pub fn side_state(&self, side: Side) -> SideState {
        SideState {
            hp: self.hp(side),
            cooldowns: self.cooldowns(side).clone(),
            buffs: self.buffs(side).clone(),
        }
    }

    /// Both submitted actions, when both are present.
    #[must_use]
    pub fn submitted_pair(&self) -> Option<PerSide<ActionId>> {
        Some(PerSide::new(
            self.host_action.get()?.clone(),
            self.guest_action.get()?.clone(),
        ))
    }

    /// Returns `true` once a guest has written its name.
    #[must_use]
    pub fn has_guest(&self) -> bool {
        !self.guest_name.is_empty()
    }

    /// Returns `true` in the terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Gameover
    }

    /// The side left standing, if exactly one side reached 0 HP.
    ///
    /// Returns `Some(None)` for a draw and `None` when nobody is down.
    #[must_use]
    pub fn decided(&self) -> Option<Option<Side>> {
        match (self.host_hp <= 0, self.guest_hp <= 0) {
            (true, true) => Some(None),
            (true, false) => Some(Some(Side::Guest)),
            (false, true) => Some(Some(Side::Host)),
            (false, false) => None,
        }
    }

    /// Returns `true` if both HP values lie within `[0, max_hp]`.
    #[must_use]
    pub fn hp_in_range(&self, max_hp: i32) -> bool {
        (0..=max_hp).contains(&self.host_hp) && (0..=max_hp).contains(&self.guest_hp)
    }
}
