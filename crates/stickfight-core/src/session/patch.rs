//! Field-level writes to a session record.
//!
//! Every write a participant makes goes through one of these constructors,
//! so the set of fields each operation touches is fixed in one place. A
//! patch is applied with a single store `update`, which the store applies
//! atomically.

use serde::Serialize;
use serde_json::Value;
use stickfight_store::Document;

use crate::resolver::TurnOutcome;
use crate::rules::ActionId;
use crate::side::{Buffs, Cooldowns, Side};

use super::record::{ActionSlot, ResolutionMark, SessionState};

/// A set of top-level fields to merge into a session record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionPatch {
    fields: Document,
}

impl SessionPatch {
    /// A side's own action submission.
    pub(crate) fn submit(side: Side, action: &ActionId, now_ms: u64) -> Self {
        let mut patch = Self::default();
        patch.put(action_field(side), &ActionSlot::filled(action.clone()));
        patch.put("updatedAt", &now_ms);
        patch
    }

    /// A guest taking the free seat.
    pub(crate) fn join(guest_name: &str, now_ms: u64) -> Self {
        let mut patch = Self::default();
        patch.put("guestName", &guest_name);
        patch.put("updatedAt", &now_ms);
        patch
    }

    /// The authority moving a filled session into play.
    pub(crate) fn promote(now_ms: u64) -> Self {
        let mut patch = Self::default();
        patch.put("state", &SessionState::Playing);
        patch.put("updatedAt", &now_ms);
        patch
    }

    /// The full result of one resolution.
    ///
    /// HP, both cleared action fields, timers, the next turn number, the
    /// last resolved actions and the new mark all travel together. A
    /// decisive outcome also moves the session to `gameover`.
    pub(crate) fn resolution(
        outcome: &TurnOutcome,
        next_turn: u32,
        mark: ResolutionMark,
        now_ms: u64,
    ) -> Self {
        let mut patch = Self::default();
        patch.put("hostHP", &outcome.state.host.hp);
        patch.put("guestHP", &outcome.state.guest.hp);
        patch.put("hostAction", &ActionSlot::EMPTY);
        patch.put("guestAction", &ActionSlot::EMPTY);
        patch.put("hostCooldowns", &outcome.state.host.cooldowns);
        patch.put("guestCooldowns", &outcome.state.guest.cooldowns);
        patch.put("hostBuffs", &outcome.state.host.buffs);
        patch.put("guestBuffs", &outcome.state.guest.buffs);
        patch.put("turn", &next_turn);
        patch.put(
            "lastHostAction",
            &ActionSlot::filled(outcome.reports.host.action.clone()),
        );
        patch.put(
            "lastGuestAction",
            &ActionSlot::filled(outcome.reports.guest.action.clone()),
        );
        patch.put("lastResolvedMark", &mark);
        if outcome.is_decisive() {
            patch.put("state", &SessionState::Gameover);
        }
        patch.put("updatedAt", &now_ms);
        patch
    }

    /// Marks the session finished without deleting it.
    pub(crate) fn terminate(now_ms: u64) -> Self {
        let mut patch = Self::default();
        patch.put("state", &SessionState::Gameover);
        patch.put("updatedAt", &now_ms);
        patch
    }

    /// Returns the session to `matchmaking` with fresh sides.
    ///
    /// Names and `lastResolvedMark` are kept.
    pub(crate) fn reset(max_hp: i32, now_ms: u64) -> Self {
        let mut patch = Self::default();
        patch.put("state", &SessionState::Matchmaking);
        patch.put("hostHP", &max_hp);
        patch.put("guestHP", &max_hp);
        for field in [
            "hostAction",
            "guestAction",
            "lastHostAction",
            "lastGuestAction",
        ] {
            patch.put(field, &ActionSlot::EMPTY);
        }
        patch.put("hostCooldowns", &Cooldowns::default());
        patch.put("guestCooldowns", &Cooldowns::default());
        patch.put("hostBuffs", &Buffs::default());
        patch.put("guestBuffs", &Buffs::default());
        patch.put("turn", &1_u32);
        patch.put("updatedAt", &now_ms);
        patch
    }

    /// Field names this patch writes.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns `true` if the patch writes `field`.
    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// The raw field map, for the store.
    #[must_use]
    pub fn into_document(self) -> Document {
        self.fields
    }

    fn put<T: Serialize + ?Sized>(&mut self, field: &str, value: &T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(field.to_string(), value);
    }
}

impl From<SessionPatch> for Document {
    fn from(patch: SessionPatch) -> Self {
        patch.fields
    }
}

/// Record field holding `side`'s pending action.
#[must_use]
pub const fn action_field(side: Side) -> &'static str {
    match side {
        Side::Host => "hostAction",
        Side::Guest => "guestAction",
    }
}
