//! Push transport for two peers on one machine.
//!
//! Without a shared record store, the host keeps the only copy of the
//! session record and pushes it to the guest after every resolution. Peers
//! talk over a [`BroadcastPort`] on channel `stickfight:<room>`.
//!
//! # Messages
//!
//! Every message is a JSON object with a `type` tag and the sender's
//! `senderRole`:
//!
//! | `type`        | sender | payload                                |
//! |---------------|--------|----------------------------------------|
//! | `join`        | guest  | `name`                                 |
//! | `start`       | host   | `host`, `guest`                        |
//! | `action`      | either | `action`                               |
//! | `turn_result` | host   | the full session record after the turn |
//! | `sync`        | host   | `record`, and the guest's `pending` action |
//!
//! The guest adopts a `turn_result` only if its `lastResolvedMark` is newer
//! than the last one adopted, so each resolved turn is applied once. A
//! guest that rejoins a running match gets `start` followed by `sync`, and
//! takes the host's record as its own.
//!
//! The host's record is the only one trusted: guest actions are checked
//! against its cooldowns, whatever the guest believed when sending.
//!
//! # Example
//!
//! ```
//! use stickfight_core::local::LocalPeer;
//! use stickfight_core::rules::ActionId;
//! use stickfight_core::session::{SessionBuilder, SessionEvent};
//! use stickfight_store::BroadcastHub;
//!
//! let hub = BroadcastHub::new();
//! let mut host = LocalPeer::host(SessionBuilder::new().seed(5), &hub, "Ann", "dojo").unwrap();
//! let mut guest = LocalPeer::join(SessionBuilder::new(), &hub, "Bob", "dojo").unwrap();
//!
//! host.poll().unwrap();
//! guest.poll().unwrap();
//!
//! let _ = guest.submit_action(&ActionId::new("block")).unwrap();
//! let _ = host.submit_action(&ActionId::new("light")).unwrap();
//! host.poll().unwrap();
//!
//! let events = guest.poll().unwrap();
//! assert!(events.iter().any(|e| matches!(e, SessionEvent::TurnResolved(_))));
//! ```

use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stickfight_store::{BroadcastHub, BroadcastPort, Clock};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::resolver::{TurnInput, TurnResolver};
use crate::rules::{ActionId, Ruleset};
use crate::session::{
    EndReason, RejectReason, ResolutionMark, Role, SessionBuilder, SessionEvent, SessionId,
    SessionPatch, SessionRecord, SessionState, SessionView, Submission, TurnResolved,
};
use crate::side::{PerSide, Side};

/// Prefix of the broadcast channel for a room.
pub const CHANNEL_PREFIX: &str = "stickfight:";

/// A local transport message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocalMessage {
    /// A guest asks to sit down.
    Join {
        /// Guest name.
        name: String,
    },
    /// The host accepted a guest; play begins.
    Start {
        /// Host name.
        host: String,
        /// Guest name.
        guest: String,
    },
    /// A side chose its action.
    Action {
        /// The chosen action.
        action: ActionId,
    },
    /// The host's record after a resolution.
    TurnResult(Box<SessionRecord>),
    /// The host's current record, for a guest rejoining mid-match.
    Sync {
        /// The host's record.
        record: Box<SessionRecord>,
        /// Guest action the host already holds for the current turn.
        #[serde(default)]
        pending: Option<ActionId>,
    },
}

/// A message with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message body.
    #[serde(flatten)]
    pub message: LocalMessage,
    /// Seat of the sender.
    #[serde(rename = "senderRole")]
    pub sender_role: Side,
}

/// One peer of a local session.
pub struct LocalPeer {
    port: BroadcastPort,
    room: SessionId,
    side: Side,
    name: String,
    rules: Ruleset,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
    record: SessionRecord,
    actions: PerSide<Option<ActionId>>,
    outbox: Vec<SessionEvent>,
    ended: bool,
}

impl std::fmt::Debug for LocalPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPeer")
            .field("room", &self.room)
            .field("side", &self.side)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl LocalPeer {
    /// Opens `room` as host and waits for a `join`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ruleset is invalid.
    pub fn host(
        builder: SessionBuilder,
        hub: &BroadcastHub,
        name: &str,
        room: &str,
    ) -> Result<Self, SessionError> {
        let peer = Self::open(builder, hub, Side::Host, name, room)?;
        info!(room, host = name, "local session hosted");
        Ok(peer)
    }

    /// Opens `room` as guest and announces itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the ruleset is invalid.
    pub fn join(
        builder: SessionBuilder,
        hub: &BroadcastHub,
        name: &str,
        room: &str,
    ) -> Result<Self, SessionError> {
        let mut peer = Self::open(builder, hub, Side::Guest, name, room)?;
        peer.record.guest_name = name.to_string();
        let reached = peer.send(LocalMessage::Join {
            name: name.to_string(),
        });
        info!(room, guest = name, reached, "local join announced");
        Ok(peer)
    }

    fn open(
        mut builder: SessionBuilder,
        hub: &BroadcastHub,
        side: Side,
        name: &str,
        room: &str,
    ) -> Result<Self, SessionError> {
        builder.rules.validate()?;
        let rng = builder.make_rng();
        let now = builder.clock.now_ms();
        let host_name = if side == Side::Host { name } else { "" };
        Ok(Self {
            port: hub.open(&format!("{CHANNEL_PREFIX}{room}")),
            room: SessionId::new(room),
            side,
            name: name.to_string(),
            record: SessionRecord::new(host_name, builder.rules.max_hp, now),
            rules: builder.rules,
            clock: builder.clock,
            rng,
            actions: PerSide::default(),
            outbox: Vec::new(),
            ended: false,
        })
    }

    /// Seat held by this peer.
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// This peer's copy of the record.
    #[must_use]
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// This peer's current view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let side = self.side;
        SessionView {
            room: self.room.clone(),
            side,
            state: self.record.state,
            turn: self.record.turn,
            own_name: self.name.clone(),
            opponent_name: self.record.name(side.opponent()).to_string(),
            own_hp: self.record.hp(side),
            opponent_hp: self.record.hp(side.opponent()),
            pending_action: self.actions.get(side).clone(),
            cooldowns: self.record.cooldowns(side).clone(),
            buffs: self.record.buffs(side).clone(),
        }
    }

    /// Handles every received message and returns the resulting events,
    /// including any raised by local submissions since the last poll.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature matches
    /// [`Participant::poll`](crate::session::Participant::poll).
    pub fn poll(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        for raw in self.port.drain() {
            let envelope = match serde_json::from_value::<Envelope>(raw) {
                Ok(envelope) => envelope,
                Err(err) => {
                    debug!(room = %self.room, error = %err, "ignoring malformed local message");
                    continue;
                }
            };
            if envelope.sender_role == self.side {
                debug!(room = %self.room, "ignoring message from own seat");
                continue;
            }
            match Role::of(self.side) {
                Role::Authority => self.host_receive(envelope.message),
                Role::Observer => self.guest_receive(envelope.message),
            }
        }
        Ok(std::mem::take(&mut self.outbox))
    }

    /// Chooses this peer's action for the current turn.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownAction`] for an action outside the
    /// ruleset.
    pub fn submit_action(&mut self, action: &ActionId) -> Result<Submission, SessionError> {
        if !self.rules.recognizes(action) {
            return Err(SessionError::UnknownAction(action.clone()));
        }
        let reason = if self.record.state == SessionState::Playing {
            if let Some(existing) = self.actions.get(self.side) {
                Some(RejectReason::AlreadySubmitted(existing.clone()))
            } else {
                match self.record.cooldowns(self.side).remaining(action) {
                    0 => None,
                    remaining => Some(RejectReason::OnCooldown {
                        action: action.clone(),
                        remaining,
                    }),
                }
            }
        } else {
            Some(RejectReason::NotPlaying(self.record.state))
        };
        if let Some(reason) = reason {
            debug!(room = %self.room, side = %self.side, %reason, "local submission rejected");
            return Ok(Submission::Rejected(reason));
        }

        *self.actions.get_mut(self.side) = Some(action.clone());
        self.send(LocalMessage::Action {
            action: action.clone(),
        });
        if self.side == Side::Host {
            self.try_resolve();
        }
        Ok(Submission::Accepted)
    }

    /// Starts a rematch with the seated guest.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthority`] for the guest.
    pub fn reset_session(&mut self) -> Result<(), SessionError> {
        if self.side != Side::Host {
            return Err(SessionError::NotAuthority("reset_session"));
        }
        self.restart();
        if self.record.has_guest() {
            self.record.state = SessionState::Playing;
            self.announce_start();
        }
        info!(room = %self.room, "local session reset");
        Ok(())
    }

    fn host_receive(&mut self, message: LocalMessage) {
        match message {
            LocalMessage::Join { name } => {
                if self.record.state == SessionState::Matchmaking {
                    self.record.guest_name = name;
                    self.record.state = SessionState::Playing;
                    self.actions = PerSide::default();
                    info!(room = %self.room, guest = %self.record.guest_name, "local guest joined");
                    self.announce_start();
                } else if name == self.record.guest_name {
                    info!(room = %self.room, guest = %name, "local guest rejoined");
                    self.announce_start();
                    self.send(LocalMessage::Sync {
                        record: Box::new(self.record.clone()),
                        pending: self.actions.guest.clone(),
                    });
                } else {
                    debug!(room = %self.room, %name, "seat taken, join ignored");
                }
            }
            LocalMessage::Action { action } => {
                if self.record.state != SessionState::Playing || self.actions.guest.is_some() {
                    debug!(room = %self.room, %action, "guest action ignored");
                    return;
                }
                if !self.rules.recognizes(&action) {
                    warn!(room = %self.room, %action, "guest sent unknown action");
                    return;
                }
                let remaining = self.record.cooldowns(Side::Guest).remaining(&action);
                if remaining > 0 {
                    debug!(room = %self.room, %action, remaining, "guest action on cooldown");
                    return;
                }
                self.actions.guest = Some(action);
                self.try_resolve();
            }
            LocalMessage::Start { .. }
            | LocalMessage::TurnResult(_)
            | LocalMessage::Sync { .. } => {
                debug!(room = %self.room, "host ignores host-only message");
            }
        }
    }

    fn guest_receive(&mut self, message: LocalMessage) {
        match message {
            LocalMessage::Start { host, guest } => {
                if guest != self.name {
                    debug!(room = %self.room, %guest, "start for another guest ignored");
                    return;
                }
                if self.record.state == SessionState::Playing && self.record.host_name == host {
                    return;
                }
                self.restart();
                self.record.host_name = host;
                self.record.state = SessionState::Playing;
                info!(room = %self.room, host = %self.record.host_name, "local match started");
                self.outbox.push(SessionEvent::StateChanged(self.view()));
            }
            LocalMessage::TurnResult(next) => self.adopt(*next),
            LocalMessage::Sync { record, pending } => self.sync(*record, pending),
            LocalMessage::Action { .. } | LocalMessage::Join { .. } => {}
        }
    }

    fn adopt(&mut self, next: SessionRecord) {
        if next.last_resolved_mark <= self.record.last_resolved_mark {
            debug!(room = %self.room, turn = next.turn, "turn result already applied");
            return;
        }
        let turn = TurnResolved {
            turn: next.turn.saturating_sub(1).max(1),
            host_action: next.last_action(Side::Host).cloned(),
            guest_action: next.last_action(Side::Guest).cloned(),
            hp_before: self.record.hp_pair(),
            hp_after: next.hp_pair(),
            mark: next.last_resolved_mark,
            own_side: self.side,
        };
        self.record = next;
        self.actions = PerSide::default();
        self.outbox.push(SessionEvent::TurnResolved(turn));
        self.outbox.push(SessionEvent::StateChanged(self.view()));
        self.note_end();
    }

    fn sync(&mut self, record: SessionRecord, pending: Option<ActionId>) {
        if record.guest_name != self.name {
            debug!(
                room = %self.room,
                guest = %record.guest_name,
                "sync for another guest ignored"
            );
            return;
        }
        if record.last_resolved_mark < self.record.last_resolved_mark {
            debug!(room = %self.room, turn = record.turn, "stale sync ignored");
            return;
        }
        self.record = record;
        self.actions = PerSide::new(None, pending);
        info!(room = %self.room, turn = self.record.turn, "local session synced");
        self.outbox.push(SessionEvent::StateChanged(self.view()));
        self.note_end();
    }

    fn try_resolve(&mut self) {
        let (Some(host_action), Some(guest_action)) =
            (self.actions.host.clone(), self.actions.guest.clone())
        else {
            return;
        };
        let input = TurnInput {
            actions: PerSide::new(host_action, guest_action),
            state: PerSide::new(
                self.record.side_state(Side::Host),
                self.record.side_state(Side::Guest),
            ),
        };
        let outcome = TurnResolver::new(&self.rules).resolve(&input, &mut *self.rng);
        let now = self.clock.now_ms();
        let mark = ResolutionMark::next_after(self.record.last_resolved_mark, now);
        let turn = self.record.turn;
        let patch = SessionPatch::resolution(&outcome, turn + 1, mark, now);
        match self.record.merged(patch.into_document()) {
            Ok(next) => self.record = next,
            Err(err) => {
                warn!(room = %self.room, error = %err, "resolution could not be applied");
                return;
            }
        }
        self.actions = PerSide::default();

        let reached = self.send(LocalMessage::TurnResult(Box::new(self.record.clone())));
        info!(
            room = %self.room,
            turn,
            host_hp = outcome.state.host.hp,
            guest_hp = outcome.state.guest.hp,
            reached,
            "local turn resolved"
        );
        self.outbox.push(SessionEvent::TurnResolved(TurnResolved {
            turn,
            host_action: Some(input.actions.host),
            guest_action: Some(input.actions.guest),
            hp_before: outcome.hp_before,
            hp_after: outcome.hp_after(),
            mark,
            own_side: Side::Host,
        }));
        self.outbox.push(SessionEvent::StateChanged(self.view()));
        self.note_end();
    }

    fn note_end(&mut self) {
        if self.record.is_terminal() && !self.ended {
            self.ended = true;
            self.outbox.push(SessionEvent::SessionEnded(EndReason::GameOver {
                winner: self.record.decided().flatten(),
            }));
        }
    }

    /// Fresh sides and turn 1; names and the resolution mark are kept.
    fn restart(&mut self) {
        let patch = SessionPatch::reset(self.rules.max_hp, self.clock.now_ms());
        match self.record.merged(patch.into_document()) {
            Ok(next) => self.record = next,
            Err(err) => warn!(room = %self.room, error = %err, "reset could not be applied"),
        }
        self.actions = PerSide::default();
        self.ended = false;
    }

    fn announce_start(&mut self) {
        self.send(LocalMessage::Start {
            host: self.record.host_name.clone(),
            guest: self.record.guest_name.clone(),
        });
        self.outbox.push(SessionEvent::StateChanged(self.view()));
    }

    fn send(&self, message: LocalMessage) -> usize {
        let envelope = Envelope {
            message,
            sender_role: self.side,
        };
        match serde_json::to_value(&envelope) {
            Ok(value) => self.port.post(&value),
            Err(err) => {
                warn!(room = %self.room, error = %err, "local message not encodable");
                0
            }
        }
    }
}

/// Encodes an envelope the way peers put it on the wire.
///
/// # Errors
///
/// Returns the JSON error if encoding fails.
pub fn encode(envelope: &Envelope) -> Result<Value, serde_json::Error> {
    serde_json::to_value(envelope)
}
