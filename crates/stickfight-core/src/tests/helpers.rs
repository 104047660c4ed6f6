//! Test helpers: scripted random sources and session setup.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::mock::StepRng;
use rand::RngCore;
use stickfight_store::{ManualClock, MemoryStore, Snapshot, Subscription};

use crate::rules::ActionId;
use crate::session::{
    Allocation, Participant, SessionBuilder, SessionEvent, SessionState, Submission, TurnResolved,
};

// =============================================================================
// Random Sources
// =============================================================================

/// A source whose every `f64` draw is 0.0, so every attack connects.
pub fn always_hit() -> StepRng {
    StepRng::new(0, 0)
}

/// A source whose every `f64` draw is just below 1.0, so every attack with
/// a hit chance below 1 misses.
pub fn always_miss() -> StepRng {
    StepRng::new(u64::MAX, 0)
}

/// Plays back a fixed list of `f64` rolls.
///
/// Panics when a roll is drawn past the end of the script, which makes
/// "no roll may happen here" directly testable.
#[derive(Debug, Clone)]
pub struct RollScript {
    rolls: VecDeque<u64>,
}

impl RollScript {
    /// Scripts `rolls`, each in `[0, 1)`.
    pub fn new(rolls: &[f64]) -> Self {
        Self {
            rolls: rolls.iter().map(|&roll| encode_roll(roll)).collect(),
        }
    }

    /// Rolls not yet drawn.
    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

/// The `u64` that `Rng::gen::<f64>()` maps to `roll`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn encode_roll(roll: f64) -> u64 {
    ((roll * (1u64 << 53) as f64) as u64) << 11
}

impl RngCore for RollScript {
    #[allow(clippy::cast_possible_truncation)]
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.rolls
            .pop_front()
            .unwrap_or_else(|| panic!("roll script exhausted"))
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

// =============================================================================
// Session Setup
// =============================================================================

/// Time the helper clocks start at. They never advance on their own.
pub const START_MS: u64 = 1_000;

/// A clock frozen at `start_ms` until moved.
pub fn manual_clock(start_ms: u64) -> ManualClock {
    ManualClock::new(start_ms)
}

/// A seeded builder on a frozen clock.
pub fn builder() -> SessionBuilder {
    SessionBuilder::new()
        .seed(7)
        .clock(Arc::new(manual_clock(START_MS)))
}

/// Hosts `room` as "Ann".
pub fn hosted(store: &MemoryStore, room: &str) -> (Participant<MemoryStore>, Allocation) {
    builder()
        .host(store.clone(), "Ann", room)
        .expect("host session")
}

/// Joins `room` as `name`; panics if the room is not joinable.
pub fn joined(store: &MemoryStore, name: &str, room: &str) -> Participant<MemoryStore> {
    builder()
        .join(store.clone(), name, room)
        .expect("join session")
        .into_participant()
        .expect("room exists")
}

/// Host "Ann" and guest "Bob" in room `dojo`, promoted and synced.
pub fn playing_pair(store: &MemoryStore) -> (Participant<MemoryStore>, Participant<MemoryStore>) {
    playing_pair_with(store, builder())
}

/// Like [`playing_pair`], with the host built from `host_builder`.
pub fn playing_pair_with(
    store: &MemoryStore,
    host_builder: SessionBuilder,
) -> (Participant<MemoryStore>, Participant<MemoryStore>) {
    let (mut host, allocation) = host_builder
        .host(store.clone(), "Ann", "dojo")
        .expect("host session");
    let mut guest = joined(store, "Bob", allocation.session_id.as_str());
    host.poll().expect("host poll");
    guest.poll().expect("guest poll");
    assert_eq!(host.record().state, SessionState::Playing);
    assert_eq!(guest.record().state, SessionState::Playing);
    (host, guest)
}

/// Submits both actions, falling back to `run` for a side whose choice is
/// rejected, then lets the host resolve.
pub fn play_turn(
    host: &mut Participant<MemoryStore>,
    guest: &mut Participant<MemoryStore>,
    host_action: &str,
    guest_action: &str,
) -> Vec<SessionEvent> {
    submit_or_run(host, host_action);
    submit_or_run(guest, guest_action);
    host.poll().expect("host poll")
}

fn submit_or_run(participant: &mut Participant<MemoryStore>, action: &str) {
    let result = participant
        .submit_action(&ActionId::new(action))
        .expect("submit");
    if let Submission::Rejected(_) = result {
        let fallback = participant
            .submit_action(&ActionId::new("run"))
            .expect("submit run");
        assert!(fallback.is_accepted(), "run rejected: {fallback:?}");
    }
}

/// Every `TurnResolved` in `events`.
pub fn resolved_turns(events: &[SessionEvent]) -> Vec<TurnResolved> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::TurnResolved(turn) => Some(turn.clone()),
            _ => None,
        })
        .collect()
}

/// Every `SessionEnded` in `events`.
pub fn end_reasons(events: &[SessionEvent]) -> Vec<crate::session::EndReason> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::SessionEnded(reason) => Some(*reason),
            _ => None,
        })
        .collect()
}

/// Drains `feed`, dropping deletions.
pub fn present(feed: &Subscription) -> Vec<Snapshot> {
    feed.drain().into_iter().filter(Option::is_some).collect()
}

#[test]
fn roll_script_round_trips_through_gen() {
    use rand::Rng;
    let mut script = RollScript::new(&[0.25, 0.7]);
    let first: f64 = script.gen();
    let second: f64 = script.gen();
    assert!((first - 0.25).abs() < 1e-12);
    assert!((second - 0.7).abs() < 1e-12);
    assert_eq!(script.remaining(), 0);
}
