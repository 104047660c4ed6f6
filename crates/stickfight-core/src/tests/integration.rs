//! End-to-end sessions: a host and a guest sharing one store.

use stickfight_store::{DeliveryMode, MemoryStore, RecordStore};

use super::helpers::*;
use crate::error::SessionError;
use crate::rules::ActionId;
use crate::session::{
    EndReason, RejectReason, SessionEvent, SessionListener, SessionPatch, SessionRecord,
    SessionState, SessionView, Submission, TurnResolved,
};
use crate::side::Side;

fn decode(snapshot: &stickfight_store::Snapshot) -> SessionRecord {
    SessionRecord::from_document(snapshot.clone().expect("record present")).expect("decodes")
}

// =============================================================================
// Allocation
// =============================================================================

#[test]
fn two_hosts_never_share_an_id() {
    let store = MemoryStore::new();
    let (first, _) = hosted(&store, "dojo");
    let (second, allocation) = hosted(&store, "dojo");
    assert_eq!(first.room().as_str(), "dojo");
    assert_eq!(second.room().as_str(), "dojo-2");
    assert_eq!(allocation.requested, "dojo");
}

#[test]
fn finished_session_id_is_reused() {
    let store = MemoryStore::new().deny_deletes(true);
    let (mut first, _) = hosted(&store, "dojo");
    first.end_session().unwrap();
    let (_second, allocation) = hosted(&store, "dojo");
    assert_eq!(allocation.session_id.as_str(), "dojo");
    assert!(allocation.reclaimed);
}

#[test]
fn reclaimed_room_shuts_out_the_previous_host() {
    let store = MemoryStore::new();
    let (mut first, _) = hosted(&store, "dojo");
    store
        .update(first.key(), SessionPatch::terminate(START_MS).into_document())
        .unwrap();
    first.poll().unwrap();
    assert!(first.is_attached());

    let (mut second, allocation) = hosted(&store, "dojo");
    assert!(allocation.reclaimed);
    assert_eq!(second.key(), first.key());
    let mut bob = joined(&store, "Bob", "dojo");
    second.poll().unwrap();
    bob.poll().unwrap();

    let _ = second.submit_action(&ActionId::new("run")).unwrap();
    let _ = bob.submit_action(&ActionId::new("run")).unwrap();
    let writes = store.write_count();
    let events = first.poll().unwrap();
    assert!(resolved_turns(&events).is_empty());
    assert!(!first.is_attached());
    assert_eq!(store.write_count(), writes);

    assert!(matches!(first.reset_session(), Err(SessionError::Replaced(_))));
    assert!(matches!(first.end_session(), Err(SessionError::Replaced(_))));
    let record = decode(&store.get(second.key()).unwrap());
    assert_eq!(record.state, SessionState::Playing);
    assert_eq!(record.guest_name, "Bob");
    assert!(record.submitted_pair().is_some());

    assert_eq!(resolved_turns(&second.poll().unwrap()).len(), 1);
}

// =============================================================================
// Full Matches
// =============================================================================

#[test]
fn light_attacks_win_in_nine_turns() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair_with(&store, builder().rng(Box::new(always_hit())));

    let mut host_events = Vec::new();
    for _ in 0..9 {
        host_events.extend(play_turn(&mut host, &mut guest, "light", "run"));
    }
    let guest_events = guest.poll().unwrap();

    assert_eq!(resolved_turns(&host_events).len(), 9);
    assert_eq!(resolved_turns(&guest_events).len(), 9);
    let winner = EndReason::GameOver {
        winner: Some(Side::Host),
    };
    assert_eq!(end_reasons(&host_events), vec![winner]);
    assert_eq!(end_reasons(&guest_events), vec![winner]);

    let record = host.record();
    assert_eq!(record.state, SessionState::Gameover);
    assert_eq!(record.guest_hp, 0);
    assert_eq!(record.turn, 10);
    assert_eq!(guest.view().own_hp, 0);
    assert_eq!(guest.view().opponent_hp, 100);
}

#[test]
fn no_actions_accepted_after_gameover() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair_with(&store, builder().rng(Box::new(always_hit())));
    for _ in 0..9 {
        play_turn(&mut host, &mut guest, "light", "run");
    }
    let writes = store.write_count();
    assert_eq!(
        guest.submit_action(&ActionId::new("run")).unwrap(),
        Submission::Rejected(RejectReason::NotPlaying(SessionState::Gameover))
    );
    assert_eq!(store.write_count(), writes);
}

#[test]
fn mutual_knockout_is_a_draw() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair_with(&store, builder().rng(Box::new(always_hit())));
    let mut events = Vec::new();
    for _ in 0..9 {
        events.extend(play_turn(&mut host, &mut guest, "light", "light"));
    }
    assert_eq!(end_reasons(&events), vec![EndReason::GameOver { winner: None }]);
    assert_eq!(host.record().hp_pair().host, 0);
    assert_eq!(host.record().hp_pair().guest, 0);
}

#[test]
fn guest_precommit_resolves_after_promotion() {
    let store = MemoryStore::new();
    let (mut host, allocation) = hosted(&store, "dojo");
    let mut guest = joined(&store, "Bob", allocation.session_id.as_str());

    // Guest acts before the host has promoted the session.
    assert!(guest.submit_action(&ActionId::new("block")).unwrap().is_accepted());
    host.poll().unwrap();
    assert_eq!(host.record().state, SessionState::Playing);

    assert!(host.submit_action(&ActionId::new("run")).unwrap().is_accepted());
    let events = host.poll().unwrap();
    let turns = resolved_turns(&events);
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].guest_action, Some(ActionId::new("block")));
}

#[test]
fn cooldown_rejection_leaves_store_untouched() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair(&store);
    play_turn(&mut host, &mut guest, "heavy", "run");

    let before = store.get(host.key()).unwrap();
    let writes = store.write_count();
    let result = host.submit_action(&ActionId::new("heavy")).unwrap();
    assert_eq!(
        result,
        Submission::Rejected(RejectReason::OnCooldown {
            action: ActionId::new("heavy"),
            remaining: 2,
        })
    );
    assert_eq!(store.write_count(), writes);
    assert_eq!(store.get(host.key()).unwrap(), before);
}

#[test]
fn heavy_is_available_again_on_the_fourth_turn() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair(&store);
    play_turn(&mut host, &mut guest, "heavy", "run");
    for _ in 0..2 {
        let result = host.submit_action(&ActionId::new("heavy")).unwrap();
        assert!(!result.is_accepted());
        play_turn(&mut host, &mut guest, "run", "run");
    }
    assert!(host.submit_action(&ActionId::new("heavy")).unwrap().is_accepted());
}

// =============================================================================
// Record Invariants
// =============================================================================

#[test]
fn resolution_is_one_atomic_write() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair(&store);
    let spy = store.subscribe(host.key()).unwrap();
    for (a, b) in [("light", "heavy"), ("item", "shield"), ("focus", "light")] {
        play_turn(&mut host, &mut guest, a, b);
    }

    let records: Vec<SessionRecord> = present(&spy).iter().map(decode).collect();
    assert!(records.len() > 3);
    for pair in records.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let hp_changed = prev.hp_pair() != next.hp_pair();
        let turn_changed = prev.turn != next.turn;
        if hp_changed || turn_changed {
            assert_eq!(next.turn, prev.turn + 1);
            assert!(next.host_action.is_empty() && next.guest_action.is_empty());
            assert!(next.last_resolved_mark > prev.last_resolved_mark);
        }
        assert!(next.hp_in_range(100));
    }
}

// =============================================================================
// Delivery
// =============================================================================

#[test]
fn coalesced_feed_still_reports_latest_resolution() {
    let store = MemoryStore::new().with_delivery(DeliveryMode::LatestOnly);
    let (mut host, mut guest) = playing_pair_with(&store, builder().rng(Box::new(always_hit())));

    play_turn(&mut host, &mut guest, "light", "run");
    play_turn(&mut host, &mut guest, "light", "run");

    let turns = resolved_turns(&guest.poll().unwrap());
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].turn, 2);
    assert_eq!(turns[0].hp_before.guest, 100);
    assert_eq!(turns[0].hp_after.guest, 76);
}

#[test]
fn out_of_order_snapshot_is_ignored() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair(&store);
    let spy = store.subscribe(host.key()).unwrap();
    let _ = spy.drain();

    play_turn(&mut host, &mut guest, "run", "run");
    let first = store.get(host.key()).unwrap();
    play_turn(&mut host, &mut guest, "run", "run");
    let second = store.get(host.key()).unwrap();

    let mut fired: Vec<TurnResolved> = resolved_turns(&guest.handle_snapshot(second).unwrap());
    let replay = guest.handle_snapshot(first).unwrap();
    fired.extend(resolved_turns(&replay));
    assert_eq!(fired.len(), 1);
    assert!(replay.is_empty());
    assert_eq!(guest.record().turn, 3);
}

#[test]
fn malformed_and_missing_snapshots_are_tolerated() {
    let store = MemoryStore::new();
    let (_host, mut guest) = playing_pair(&store);
    let junk = stickfight_store::document(serde_json::json!({ "hostHP": "lots" }));
    assert!(guest.handle_snapshot(Some(junk)).unwrap().is_empty());
    assert_eq!(guest.record().state, SessionState::Playing);
}

// =============================================================================
// Teardown and Rematch
// =============================================================================

#[test]
fn guest_learns_of_deletion_once() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair(&store);
    assert_eq!(
        host.end_session().unwrap(),
        SessionEvent::SessionEnded(EndReason::Abandoned)
    );
    let events = guest.poll().unwrap();
    assert_eq!(end_reasons(&events), vec![EndReason::Abandoned]);
    assert!(guest.handle_snapshot(None).unwrap().is_empty());
}

#[test]
fn refused_delete_leaves_an_inert_record() {
    let store = MemoryStore::new().deny_deletes(true);
    let (mut host, mut guest) = playing_pair(&store);
    host.end_session().unwrap();

    let events = guest.poll().unwrap();
    assert_eq!(
        end_reasons(&events),
        vec![EndReason::GameOver { winner: None }]
    );
    assert!(!guest.submit_action(&ActionId::new("light")).unwrap().is_accepted());
}

#[test]
fn rematch_after_reset() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair_with(&store, builder().rng(Box::new(always_hit())));
    for _ in 0..9 {
        play_turn(&mut host, &mut guest, "light", "run");
    }
    let first_game = guest.poll().unwrap();
    let last_mark = resolved_turns(&first_game).last().unwrap().mark;

    host.reset_session().unwrap();
    host.poll().unwrap();
    assert_eq!(host.record().state, SessionState::Playing);
    assert_eq!(host.record().turn, 1);
    assert_eq!(host.record().hp_pair().guest, 100);
    assert!(host.record().host_cooldowns.is_empty());

    guest.poll().unwrap();
    assert_eq!(guest.view().own_hp, 100);

    for _ in 0..9 {
        play_turn(&mut host, &mut guest, "light", "run");
    }
    let second_game = guest.poll().unwrap();
    let turns = resolved_turns(&second_game);
    assert_eq!(turns.len(), 9);
    assert!(turns[0].mark > last_mark);
    assert_eq!(turns[0].turn, 1);
    assert_eq!(end_reasons(&second_game).len(), 1);
}

// =============================================================================
// Listener
// =============================================================================

#[derive(Default)]
struct Scoreboard {
    changes: usize,
    hp_log: Vec<(i32, i32)>,
    ended: Option<EndReason>,
}

impl SessionListener for Scoreboard {
    fn on_state_changed(&mut self, _view: &SessionView) {
        self.changes += 1;
    }

    fn on_turn_resolved(&mut self, turn: &TurnResolved) {
        self.hp_log.push((turn.hp_after.host, turn.hp_after.guest));
    }

    fn on_session_ended(&mut self, reason: EndReason) {
        self.ended = Some(reason);
    }
}

#[test]
fn listener_sees_the_whole_match() {
    let store = MemoryStore::new();
    let (mut host, mut guest) = playing_pair_with(&store, builder().rng(Box::new(always_hit())));
    let mut board = Scoreboard::default();
    for _ in 0..9 {
        play_turn(&mut host, &mut guest, "run", "light");
        board.dispatch_all(&guest.poll().unwrap());
    }
    assert_eq!(board.hp_log.len(), 9);
    assert_eq!(board.hp_log[0], (88, 100));
    assert_eq!(board.hp_log[8], (0, 100));
    assert_eq!(
        board.ended,
        Some(EndReason::GameOver {
            winner: Some(Side::Guest)
        })
    );
    assert!(board.changes >= 9);
}
