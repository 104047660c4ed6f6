//! The host's half of the protocol.
//!
//! ```text
//! matchmaking ──(guest name appears)──► playing ──(HP reaches 0)──► gameover
//!      ▲                                                              │
//!      └────────────────────────── reset ─────────────────────────────┘
//! ```
//!
//! The authority promotes once per matchmaking phase and resolves each turn
//! once. Before resolving it re-reads the record, so the resolution always
//! works from the latest stored HP and timers even if the snapshot that
//! triggered it was already superseded.

use stickfight_store::RecordStore;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::resolver::{TurnInput, TurnResolver};
use crate::side::{PerSide, Side};

use super::events::{SessionEvent, TurnResolved};
use super::participant::Participant;
use super::patch::SessionPatch;
use super::record::{ResolutionMark, SessionRecord, SessionState};

impl<S: RecordStore> Participant<S> {
    pub(super) fn authority_step(
        &mut self,
        record: &SessionRecord,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        match record.state {
            SessionState::Matchmaking => {
                self.promote_if_ready(record)?;
                Ok(Vec::new())
            }
            SessionState::Playing => {
                if record.submitted_pair().is_none() || record.turn <= self.book.resolved_turn {
                    return Ok(Vec::new());
                }
                Ok(self
                    .resolve_turn(record.turn)?
                    .map(SessionEvent::TurnResolved)
                    .into_iter()
                    .collect())
            }
            SessionState::Gameover => Ok(Vec::new()),
        }
    }

    fn promote_if_ready(&mut self, record: &SessionRecord) -> Result<(), SessionError> {
        if !record.has_guest() {
            self.book.promotion_sent = false;
            return Ok(());
        }
        if self.book.promotion_sent {
            return Ok(());
        }
        let patch = SessionPatch::promote(self.clock.now_ms());
        self.store.update(self.key(), patch.into_document())?;
        self.book.promotion_sent = true;
        info!(room = self.room_code(), guest = %record.guest_name, "session promoted to playing");
        Ok(())
    }

    fn resolve_turn(&mut self, turn: u32) -> Result<Option<TurnResolved>, SessionError> {
        let Some(current) = self.fetch_attached()? else {
            return Ok(None);
        };
        if current.state != SessionState::Playing || current.turn != turn {
            debug!(room = self.room_code(), turn, "trigger superseded, not resolving");
            return Ok(None);
        }
        let Some(actions) = current.submitted_pair() else {
            return Ok(None);
        };

        let input = TurnInput {
            actions,
            state: PerSide::new(current.side_state(Side::Host), current.side_state(Side::Guest)),
        };
        let outcome = TurnResolver::new(&self.rules).resolve(&input, &mut *self.rng);

        let floor = self
            .mirror
            .seen_mark
            .map_or(current.last_resolved_mark, |seen| seen.max(current.last_resolved_mark));
        let now = self.clock.now_ms();
        let mark = ResolutionMark::next_after(floor, now);
        let patch = SessionPatch::resolution(&outcome, turn + 1, mark, now);
        self.store.update(self.key(), patch.into_document())?;

        self.book.resolved_turn = turn;
        self.mirror.seen_mark = Some(mark);
        info!(
            room = self.room_code(),
            turn,
            host_action = %input.actions.host,
            guest_action = %input.actions.guest,
            host_hp = outcome.state.host.hp,
            guest_hp = outcome.state.guest.hp,
            %mark,
            "turn resolved"
        );

        Ok(Some(TurnResolved {
            turn,
            host_action: Some(input.actions.host),
            guest_action: Some(input.actions.guest),
            hp_before: outcome.hp_before,
            hp_after: outcome.hp_after(),
            mark,
            own_side: Side::Host,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ActionId;
    use crate::tests::{hosted, joined, playing_pair, resolved_turns};
    use stickfight_store::MemoryStore;

    #[test]
    fn promotes_once_guest_is_seated() {
        let store = MemoryStore::new();
        let (mut host, _) = hosted(&store, "dojo");
        host.poll().unwrap();
        assert_eq!(host.record().state, SessionState::Matchmaking);

        let _guest = joined(&store, "Bob", "dojo");
        host.poll().unwrap();
        assert_eq!(host.record().state, SessionState::Playing);
    }

    #[test]
    fn repeated_guest_snapshots_promote_once() {
        let store = MemoryStore::new();
        let (mut host, _) = hosted(&store, "dojo");
        let _guest = joined(&store, "Bob", "dojo");
        let seated = store.get(host.key()).unwrap();
        host.handle_snapshot(seated.clone()).unwrap();
        let writes = store.write_count();
        host.handle_snapshot(seated).unwrap();
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn resolves_when_both_actions_are_in() {
        let store = MemoryStore::new();
        let (mut host, mut guest) = playing_pair(&store);
        let _ = host.submit_action(&ActionId::new("light")).unwrap();
        let _ = guest.submit_action(&ActionId::new("run")).unwrap();
        let events = host.poll().unwrap();
        let turns = resolved_turns(&events);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].turn, 1);
        assert_eq!(turns[0].own_side, Side::Host);

        let record = host.fetch().unwrap().unwrap();
        assert_eq!(record.turn, 2);
        assert!(record.submitted_pair().is_none());
        assert!(record.last_resolved_mark.is_set());
    }

    #[test]
    fn one_action_does_not_resolve() {
        let store = MemoryStore::new();
        let (mut host, _guest) = playing_pair(&store);
        let _ = host.submit_action(&ActionId::new("light")).unwrap();
        assert!(resolved_turns(&host.poll().unwrap()).is_empty());
        assert_eq!(host.fetch().unwrap().unwrap().turn, 1);
    }

    #[test]
    fn replayed_trigger_does_not_resolve_twice() {
        let store = MemoryStore::new();
        let (mut host, mut guest) = playing_pair(&store);
        let _ = host.submit_action(&ActionId::new("light")).unwrap();
        let _ = guest.submit_action(&ActionId::new("run")).unwrap();
        let trigger = store.get(host.key()).unwrap();
        host.poll().unwrap();
        let writes = store.write_count();
        let events = host.handle_snapshot(trigger).unwrap();
        assert!(events.is_empty());
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn marks_increase_with_a_frozen_clock() {
        let store = MemoryStore::new();
        let (mut host, mut guest) = playing_pair(&store);
        let mut marks = Vec::new();
        for _ in 0..3 {
            let _ = host.submit_action(&ActionId::new("run")).unwrap();
            let _ = guest.submit_action(&ActionId::new("run")).unwrap();
            marks.extend(resolved_turns(&host.poll().unwrap()).iter().map(|t| t.mark));
        }
        assert_eq!(marks.len(), 3);
        assert!(marks.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
