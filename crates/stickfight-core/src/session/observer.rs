//! The guest's half of the protocol.
//!
//! The observer never diffs HP or action fields to decide whether a turn
//! was resolved. It compares `lastResolvedMark` with the highest mark it has
//! reacted to, which holds up under duplicated, reordered and coalesced
//! notifications alike.

use stickfight_store::RecordStore;
use tracing::debug;

use super::events::SessionEvent;
use super::participant::Participant;
use super::record::SessionRecord;

impl<S: RecordStore> Participant<S> {
    pub(super) fn observer_step(&mut self, record: &SessionRecord) -> Vec<SessionEvent> {
        match self.mirror.detect_resolution(record) {
            Some(turn) => {
                debug!(
                    room = self.room_code(),
                    turn = turn.turn,
                    mark = %turn.mark,
                    "observed resolution"
                );
                vec![SessionEvent::TurnResolved(turn)]
            }
            None => Vec::new(),
        }
    }
}
