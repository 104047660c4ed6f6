//! Per-process cache of the shared record.
//!
//! The mirror is never written back to the store. It remembers the last
//! record this participant applied, the highest resolution mark it has
//! reacted to, and the action it has submitted but not yet seen resolved.

use crate::rules::{ActionId, BuffId};
use crate::side::{Buffs, Cooldowns, Side};

use super::events::{EndReason, TurnResolved};
use super::record::{ResolutionMark, SessionRecord};

/// An action this participant submitted and has not yet seen resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingAction {
    pub action: ActionId,
    /// Turn the action was submitted for.
    pub turn: u32,
    /// Resolution mark current at submission.
    pub mark: ResolutionMark,
    /// A snapshot has shown the action in the shared record.
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Mirror {
    side: Side,
    pub last: SessionRecord,
    /// `None` until the first snapshot, so that snapshot never counts as a
    /// resolution.
    pub seen_mark: Option<ResolutionMark>,
    pub pending: Option<PendingAction>,
    pub cooldowns: Cooldowns,
    pub buffs: Buffs,
    pub ended: bool,
}

impl Mirror {
    pub fn new(side: Side, record: SessionRecord) -> Self {
        Self {
            side,
            cooldowns: record.cooldowns(side).clone(),
            buffs: record.buffs(side).clone(),
            last: record,
            seen_mark: None,
            pending: None,
            ended: false,
        }
    }

    /// Returns `true` if `record` predates a resolution already seen.
    pub fn is_stale(&self, record: &SessionRecord) -> bool {
        self.seen_mark
            .is_some_and(|seen| record.last_resolved_mark < seen)
    }

    /// The resolution `record` announces, if this mirror has not reacted to
    /// it yet.
    pub fn detect_resolution(&self, record: &SessionRecord) -> Option<TurnResolved> {
        let seen = self.seen_mark?;
        let mark = record.last_resolved_mark;
        if !mark.is_set() || mark <= seen {
            return None;
        }
        Some(TurnResolved {
            turn: record.turn.saturating_sub(1).max(1),
            host_action: record.last_action(Side::Host).cloned(),
            guest_action: record.last_action(Side::Guest).cloned(),
            hp_before: self.last.hp_pair(),
            hp_after: record.hp_pair(),
            mark,
            own_side: self.side,
        })
    }

    /// Makes `record` the current view.
    ///
    /// Own timers are replaced by the record's values, discarding any
    /// optimistic entries.
    pub fn absorb(&mut self, record: SessionRecord) {
        let mark = record.last_resolved_mark;
        self.seen_mark = Some(self.seen_mark.map_or(mark, |seen| seen.max(mark)));
        self.cooldowns = record.cooldowns(self.side).clone();
        self.buffs = record.buffs(self.side).clone();
        self.settle_pending(&record);
        if !record.is_terminal() {
            self.ended = false;
        }
        self.last = record;
    }

    /// Reports the end of the game the first time a terminal record is
    /// absorbed.
    pub fn note_end(&mut self) -> Option<EndReason> {
        if !self.last.is_terminal() || self.ended {
            return None;
        }
        self.ended = true;
        Some(EndReason::GameOver {
            winner: self.last.decided().flatten(),
        })
    }

    /// Reports abandonment the first time the record is seen deleted.
    pub fn note_gone(&mut self) -> Option<EndReason> {
        if self.ended {
            return None;
        }
        self.ended = true;
        self.pending = None;
        Some(EndReason::Abandoned)
    }

    /// Records a successful submission and its optimistic timers.
    pub fn note_submitted(
        &mut self,
        pending: PendingAction,
        cooldown: u32,
        buff: Option<(BuffId, u32)>,
    ) {
        self.cooldowns.set(pending.action.clone(), cooldown);
        if let Some((buff, duration)) = buff {
            self.buffs.set(buff, duration);
        }
        self.pending = Some(pending);
    }

    fn settle_pending(&mut self, record: &SessionRecord) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let own = record.action(self.side);
        if own == Some(&pending.action) {
            pending.confirmed = true;
        }
        let resolved = record.last_resolved_mark > pending.mark;
        let cleared = pending.confirmed && own.is_none();
        let rewound = record.turn < pending.turn;
        if resolved || cleared || rewound || record.is_terminal() {
            self.pending = None;
        }
    }
}
