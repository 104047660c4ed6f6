//! Notifications a participant raises for its application.
//!
//! Snapshot handling returns a `Vec<SessionEvent>` rather than calling into
//! the application directly; [`SessionListener::dispatch`] routes them to
//! callbacks for callers that prefer that shape.

use serde::{Deserialize, Serialize};

use crate::rules::ActionId;
use crate::side::{Buffs, Cooldowns, PerSide, Side};

use super::record::{ResolutionMark, SessionState};
use super::registry::SessionId;

/// A participant's local view of its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    /// Room code.
    pub room: SessionId,
    /// The seat this participant holds.
    pub side: Side,
    /// Lifecycle state.
    pub state: SessionState,
    /// Current turn number.
    pub turn: u32,
    /// This participant's name.
    pub own_name: String,
    /// The opponent's name; empty until someone sits down.
    pub opponent_name: String,
    /// This participant's HP.
    pub own_hp: i32,
    /// The opponent's HP.
    pub opponent_hp: i32,
    /// Action submitted and not yet resolved.
    pub pending_action: Option<ActionId>,
    /// This participant's cooldowns.
    pub cooldowns: Cooldowns,
    /// This participant's buffs.
    pub buffs: Buffs,
}

impl SessionView {
    /// Returns `true` if `action` may be submitted right now, as far as
    /// this view knows.
    #[must_use]
    pub fn can_submit(&self, action: &ActionId) -> bool {
        let open = match self.side {
            Side::Host => self.state == SessionState::Playing,
            Side::Guest => self.state != SessionState::Gameover,
        };
        open && self.pending_action.is_none() && !self.cooldowns.is_active(action)
    }
}

/// A resolved turn, as seen by one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResolved {
    /// The turn that was resolved.
    pub turn: u32,
    /// Host action resolved this turn.
    pub host_action: Option<ActionId>,
    /// Guest action resolved this turn.
    pub guest_action: Option<ActionId>,
    /// HP before resolution.
    pub hp_before: PerSide<i32>,
    /// HP after resolution.
    pub hp_after: PerSide<i32>,
    /// Resolution token.
    pub mark: ResolutionMark,
    /// The seat of the participant reporting.
    pub own_side: Side,
}

impl TurnResolved {
    /// The reporting participant's action.
    #[must_use]
    pub fn own_action(&self) -> Option<&ActionId> {
        self.action(self.own_side)
    }

    /// The opponent's action.
    #[must_use]
    pub fn opponent_action(&self) -> Option<&ActionId> {
        self.action(self.own_side.opponent())
    }

    /// HP change of `side`.
    #[must_use]
    pub fn hp_delta(&self, side: Side) -> i32 {
        self.hp_after.get(side) - self.hp_before.get(side)
    }

    fn action(&self, side: Side) -> Option<&ActionId> {
        match side {
            Side::Host => self.host_action.as_ref(),
            Side::Guest => self.guest_action.as_ref(),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    /// A side reached 0 HP. `None` is a draw; it is also used when the
    /// record was terminated with both sides still standing.
    GameOver {
        /// The surviving side.
        winner: Option<Side>,
    },
    /// The record was deleted or this participant ended it.
    Abandoned,
}

/// Something the application should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session record changed.
    StateChanged(SessionView),
    /// A turn was resolved. Raised exactly once per resolution.
    TurnResolved(TurnResolved),
    /// The session ended. Raised once per game.
    SessionEnded(EndReason),
}

/// Callback sink for session events.
///
/// Every method defaults to doing nothing.
pub trait SessionListener {
    /// The session record changed.
    fn on_state_changed(&mut self, _view: &SessionView) {}

    /// A turn was resolved.
    fn on_turn_resolved(&mut self, _turn: &TurnResolved) {}

    /// The session ended.
    fn on_session_ended(&mut self, _reason: EndReason) {}

    /// Routes one event to its callback.
    fn dispatch(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged(view) => self.on_state_changed(view),
            SessionEvent::TurnResolved(turn) => self.on_turn_resolved(turn),
            SessionEvent::SessionEnded(reason) => self.on_session_ended(*reason),
        }
    }

    /// Routes every event in order.
    fn dispatch_all(&mut self, events: &[SessionEvent]) {
        for event in events {
            self.dispatch(event);
        }
    }
}
