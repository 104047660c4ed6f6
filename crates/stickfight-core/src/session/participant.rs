//! One side of a session: hosting, joining, submitting and reacting.

use std::fmt;
use std::sync::Arc;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stickfight_store::{Clock, RecordStore, Snapshot, Subscription, SystemClock};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::rules::{ActionId, ActionKind, Ruleset};
use crate::side::Side;

use super::events::{EndReason, SessionEvent, SessionView};
use super::mirror::{Mirror, PendingAction};
use super::patch::SessionPatch;
use super::record::{SessionRecord, SessionState};
use super::registry::{Allocation, SessionId, SessionRegistry};
use super::{RejectReason, Role, Submission};

/// Upper bound on drain rounds in one [`Participant::poll`]. Each round
/// may queue follow-up snapshots from this participant's own writes.
const MAX_POLL_ROUNDS: usize = 16;

/// Mixed into the seed of the hosting-token stream so it never mirrors the
/// combat rolls.
const HOSTING_SALT: u64 = 0x686f_7374_696e_6721;

/// Configures and creates participants.
pub struct SessionBuilder {
    pub(crate) rules: Ruleset,
    pub(crate) config: SessionConfig,
    pub(crate) clock: Arc<dyn Clock>,
    rng: Option<Box<dyn RngCore + Send>>,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("rules", &self.rules.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            rules: Ruleset::standard(),
            config: SessionConfig::default(),
            clock: Arc::new(SystemClock),
            rng: None,
        }
    }
}

impl SessionBuilder {
    /// A builder with the standard ruleset and default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ruleset.
    #[must_use]
    pub fn rules(mut self, rules: Ruleset) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Seeds the default RNG.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Sets the time source used for marks and timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the random source used for hit rolls and id suffixes.
    #[must_use]
    pub fn rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Creates a session and seats `name` as host.
    ///
    /// # Errors
    ///
    /// Returns an error if the ruleset is invalid, no id can be allocated,
    /// or the store fails.
    pub fn host<S: RecordStore>(
        mut self,
        store: S,
        name: &str,
        requested_room: &str,
    ) -> Result<(Participant<S>, Allocation), SessionError> {
        self.rules.validate()?;
        let mut rng = self.make_rng();
        let allocation =
            SessionRegistry::new(&store, &self.config).allocate(requested_room, &mut *rng)?;
        let key = self.config.record_key(allocation.session_id.as_str());
        let now = self.clock.now_ms();

        let replaced = if allocation.reclaimed {
            store
                .get(&key)?
                .and_then(|doc| SessionRecord::from_document(doc).ok())
                .map(|record| record.host_token)
        } else {
            None
        };
        let token = self.hosting_token(now, replaced.as_deref());
        let record = SessionRecord::new(name, self.rules.max_hp, now).with_host_token(&token);
        store.set(&key, record.to_document().map_err(|source| SessionError::Malformed {
            key: key.clone(),
            source,
        })?)?;
        let feed = store.subscribe(&key)?;

        info!(
            room = %allocation.session_id,
            host = name,
            renamed = allocation.renamed(),
            reclaimed = allocation.reclaimed,
            "session hosted"
        );

        let participant = Participant::assemble(
            store,
            self.rules,
            self.config,
            self.clock,
            rng,
            Seat {
                room: allocation.session_id.clone(),
                key,
                side: Side::Host,
                name: name.to_string(),
                token,
            },
            feed,
            record,
        );
        Ok((participant, allocation))
    }

    /// Seats `name` as guest of `room`.
    ///
    /// A missing room, or a finished one this name is not seated in, is
    /// reported as [`JoinOutcome::NotFound`] and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionFull`] if another guest holds the
    /// seat, or an error if the record is malformed or the store fails.
    pub fn join<S: RecordStore>(
        mut self,
        store: S,
        name: &str,
        room: &str,
    ) -> Result<JoinOutcome<S>, SessionError> {
        self.rules.validate()?;
        let key = self.config.record_key(room);
        let Some(doc) = store.get(&key)? else {
            info!(room, "join target not found");
            return Ok(JoinOutcome::NotFound);
        };
        let mut record = SessionRecord::from_document(doc).map_err(|source| {
            SessionError::Malformed {
                key: key.clone(),
                source,
            }
        })?;

        let seated = record.guest_name == name;
        if record.is_terminal() && !seated {
            info!(room, "join target already finished");
            return Ok(JoinOutcome::NotFound);
        }
        if !seated {
            if record.has_guest() {
                return Err(SessionError::SessionFull {
                    room: room.to_string(),
                    guest: record.guest_name,
                });
            }
            let patch = SessionPatch::join(name, self.clock.now_ms());
            record = record
                .merged(patch.clone().into_document())
                .map_err(|source| SessionError::Malformed {
                    key: key.clone(),
                    source,
                })?;
            store.update(&key, patch.into_document())?;
            info!(room, guest = name, "joined session");
        } else {
            debug!(room, guest = name, "already seated, rejoining");
        }

        let feed = store.subscribe(&key)?;
        let rng = self.make_rng();
        let token = record.host_token.clone();
        Ok(JoinOutcome::Joined(Participant::assemble(
            store,
            self.rules,
            self.config,
            self.clock,
            rng,
            Seat {
                room: SessionId::new(room),
                key,
                side: Side::Guest,
                name: name.to_string(),
                token,
            },
            feed,
            record,
        )))
    }

    pub(crate) fn make_rng(&mut self) -> Box<dyn RngCore + Send> {
        if let Some(rng) = self.rng.take() {
            return rng;
        }
        let seed = self.config.seed.unwrap_or_else(rand::random);
        Box::new(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Draws a hosting token distinct from the one being replaced.
    ///
    /// Drawn from its own stream so seeded matches keep their combat rolls.
    fn hosting_token(&self, now_ms: u64, replaced: Option<&str>) -> String {
        let seed = self
            .config
            .seed
            .map_or_else(rand::random, |seed| seed ^ now_ms.rotate_left(32));
        let mut draws = ChaCha8Rng::seed_from_u64(seed ^ HOSTING_SALT);
        loop {
            let token = format!("{:016x}", draws.next_u64());
            if replaced != Some(token.as_str()) {
                return token;
            }
        }
    }
}

/// Result of [`SessionBuilder::join`].
#[derive(Debug)]
pub enum JoinOutcome<S: RecordStore> {
    /// Seated as guest.
    Joined(Participant<S>),
    /// No joinable session under that id.
    NotFound,
}

impl<S: RecordStore> JoinOutcome<S> {
    /// Returns `true` if the join succeeded.
    #[must_use]
    pub const fn found(&self) -> bool {
        matches!(self, Self::Joined(_))
    }

    /// The participant, if seated.
    #[must_use]
    pub fn into_participant(self) -> Option<Participant<S>> {
        match self {
            Self::Joined(participant) => Some(participant),
            Self::NotFound => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Seat {
    room: SessionId,
    key: String,
    side: Side,
    name: String,
    /// Hosting token of the record this participant attached to.
    token: String,
}

/// Authority-side bookkeeping. Unused by observers.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct AuthorityBook {
    /// A promote write has been issued for the current matchmaking phase.
    pub promotion_sent: bool,
    /// Highest turn this authority has resolved since the last reset.
    pub resolved_turn: u32,
}

/// A seated participant.
///
/// Drive it with [`poll`](Self::poll) (or feed snapshots to
/// [`handle_snapshot`](Self::handle_snapshot) directly) and act with
/// [`submit_action`](Self::submit_action).
pub struct Participant<S: RecordStore> {
    pub(super) store: S,
    pub(super) rules: Ruleset,
    config: SessionConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) rng: Box<dyn RngCore + Send>,
    seat: Seat,
    feed: Option<Subscription>,
    pub(super) mirror: Mirror,
    pub(super) book: AuthorityBook,
}

impl<S: RecordStore> fmt::Debug for Participant<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("room", &self.seat.room)
            .field("side", &self.seat.side)
            .field("attached", &self.feed.is_some())
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore> Participant<S> {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        store: S,
        rules: Ruleset,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
        seat: Seat,
        feed: Subscription,
        record: SessionRecord,
    ) -> Self {
        Self {
            store,
            rules,
            config,
            clock,
            rng,
            mirror: Mirror::new(seat.side, record),
            seat,
            feed: Some(feed),
            book: AuthorityBook::default(),
        }
    }

    /// Room code.
    #[must_use]
    pub fn room(&self) -> &SessionId {
        &self.seat.room
    }

    /// Store key of the session record.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.seat.key
    }

    /// Seat held by this participant.
    #[must_use]
    pub fn side(&self) -> Side {
        self.seat.side
    }

    /// Protocol role.
    #[must_use]
    pub fn role(&self) -> Role {
        Role::of(self.seat.side)
    }

    /// The ruleset in force.
    #[must_use]
    pub fn rules(&self) -> &Ruleset {
        &self.rules
    }

    /// The configuration in force.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns `false` once the participant has left or ended the session.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.feed.is_some()
    }

    /// The most recently applied record.
    #[must_use]
    pub fn record(&self) -> &SessionRecord {
        &self.mirror.last
    }

    /// This participant's current view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let side = self.seat.side;
        let record = &self.mirror.last;
        SessionView {
            room: self.seat.room.clone(),
            side,
            state: record.state,
            turn: record.turn,
            own_name: self.seat.name.clone(),
            opponent_name: record.name(side.opponent()).to_string(),
            own_hp: record.hp(side),
            opponent_hp: record.hp(side.opponent()),
            pending_action: self.mirror.pending.as_ref().map(|p| p.action.clone()),
            cooldowns: self.mirror.cooldowns.clone(),
            buffs: self.mirror.buffs.clone(),
        }
    }

    /// Applies every queued snapshot, including the ones this participant's
    /// own writes produce while doing so.
    ///
    /// # Errors
    ///
    /// Returns an error if an authority write fails.
    pub fn poll(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        for _ in 0..MAX_POLL_ROUNDS {
            let Some(feed) = self.feed.as_ref() else {
                break;
            };
            let batch = feed.drain();
            if batch.is_empty() {
                break;
            }
            for snapshot in batch {
                events.extend(self.handle_snapshot(snapshot)?);
            }
        }
        Ok(events)
    }

    /// Applies one change notification.
    ///
    /// Missing and undecodable snapshots end or skip processing without
    /// error. Snapshots older than a resolution already seen are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if an authority write fails.
    pub fn handle_snapshot(&mut self, snapshot: Snapshot) -> Result<Vec<SessionEvent>, SessionError> {
        let Some(doc) = snapshot else {
            return Ok(self
                .mirror
                .note_gone()
                .map(|reason| {
                    info!(room = %self.seat.room, "session record deleted");
                    vec![SessionEvent::SessionEnded(reason)]
                })
                .unwrap_or_default());
        };
        let record = match SessionRecord::from_document(doc) {
            Ok(record) => record,
            Err(err) => {
                warn!(room = %self.seat.room, error = %err, "ignoring malformed snapshot");
                return Ok(Vec::new());
            }
        };
        if !record.is_hosted_by(&self.seat.token) {
            warn!(room = %self.seat.room, "room reclaimed by another host, detaching");
            let events = self
                .mirror
                .note_gone()
                .map(|reason| vec![SessionEvent::SessionEnded(reason)])
                .unwrap_or_default();
            self.leave();
            return Ok(events);
        }
        if self.mirror.is_stale(&record) {
            debug!(
                room = %self.seat.room,
                mark = %record.last_resolved_mark,
                "ignoring stale snapshot"
            );
            return Ok(Vec::new());
        }

        let mut events = match self.role() {
            Role::Authority => self.authority_step(&record)?,
            Role::Observer => self.observer_step(&record),
        };

        self.mirror.absorb(record);
        events.push(SessionEvent::StateChanged(self.view()));
        if let Some(reason) = self.mirror.note_end() {
            info!(room = %self.seat.room, ?reason, "session ended");
            events.push(SessionEvent::SessionEnded(reason));
        }
        Ok(events)
    }

    /// Submits this side's action for the current turn.
    ///
    /// Preconditions are checked against the stored record, not the local
    /// mirror. Expected races come back as [`Submission::Rejected`] and
    /// leave the store untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownAction`] for an action outside the
    /// ruleset, [`SessionError::Detached`] after leaving, or an error if
    /// the store fails.
    pub fn submit_action(&mut self, action: &ActionId) -> Result<Submission, SessionError> {
        if self.feed.is_none() {
            return Err(SessionError::Detached(self.seat.room.to_string()));
        }
        let Some(rule) = self.rules.action(action).cloned() else {
            return Err(SessionError::UnknownAction(action.clone()));
        };
        let side = self.seat.side;

        let Some(record) = self.fetch_attached()? else {
            return Ok(self.reject(RejectReason::SessionMissing));
        };
        let open = match record.state {
            SessionState::Playing => true,
            SessionState::Matchmaking => side == Side::Guest && record.guest_name == self.seat.name,
            SessionState::Gameover => false,
        };
        if !open {
            return Ok(self.reject(RejectReason::NotPlaying(record.state)));
        }
        if let Some(existing) = record.action(side) {
            return Ok(self.reject(RejectReason::AlreadySubmitted(existing.clone())));
        }
        let remaining = record.cooldowns(side).remaining(action);
        if remaining > 0 {
            return Ok(self.reject(RejectReason::OnCooldown {
                action: action.clone(),
                remaining,
            }));
        }

        let patch = SessionPatch::submit(side, action, self.clock.now_ms());
        self.store.update(&self.seat.key, patch.into_document())?;

        let buff = match &rule.kind {
            ActionKind::Item {
                buff: Some(buff),
                duration,
                ..
            } => Some((buff.clone(), *duration)),
            _ => None,
        };
        self.mirror.note_submitted(
            PendingAction {
                action: action.clone(),
                turn: record.turn,
                mark: record.last_resolved_mark,
                confirmed: false,
            },
            rule.cooldown,
            buff,
        );
        debug!(room = %self.seat.room, %side, %action, turn = record.turn, "action submitted");
        Ok(Submission::Accepted)
    }

    /// Returns the session to `matchmaking` with full HP and cleared
    /// actions and timers. Seated names are kept, so the authority
    /// re-promotes on its next poll.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthority`] for the guest,
    /// [`SessionError::Replaced`] (and detaches) if another host has
    /// reclaimed the room, or an error if the store fails.
    pub fn reset_session(&mut self) -> Result<(), SessionError> {
        self.require_authority("reset_session")?;
        self.fetch_attached()?;
        let patch = SessionPatch::reset(self.rules.max_hp, self.clock.now_ms());
        self.store.update(&self.seat.key, patch.into_document())?;
        self.book = AuthorityBook::default();
        self.mirror.pending = None;
        info!(room = %self.seat.room, "session reset");
        Ok(())
    }

    /// Tears the session down and detaches.
    ///
    /// The record is deleted; if the store refuses, it is marked
    /// `gameover` instead so it stays inert.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthority`] for the guest,
    /// [`SessionError::Replaced`] (and detaches, leaving the record alone)
    /// if another host has reclaimed the room, or an error if neither the
    /// delete nor the fallback write succeeds.
    pub fn end_session(&mut self) -> Result<SessionEvent, SessionError> {
        self.require_authority("end_session")?;
        self.fetch_attached()?;
        match self.store.delete(&self.seat.key) {
            Ok(()) => info!(room = %self.seat.room, "session deleted"),
            Err(stickfight_store::StoreError::PermissionDenied { .. }) => {
                warn!(room = %self.seat.room, "delete refused, marking session gameover");
                let patch = SessionPatch::terminate(self.clock.now_ms());
                self.store.update(&self.seat.key, patch.into_document())?;
            }
            Err(err) => return Err(err.into()),
        }
        self.leave();
        self.mirror.ended = true;
        Ok(SessionEvent::SessionEnded(EndReason::Abandoned))
    }

    /// Stops listening. The shared record is left as it is.
    pub fn leave(&mut self) {
        if self.feed.take().is_some() {
            debug!(room = %self.seat.room, side = %self.seat.side, "left session");
        }
        self.mirror.pending = None;
    }

    /// Reads the stored record.
    ///
    /// A record written by a different hosting is reported as
    /// [`SessionError::Replaced`], never returned.
    pub(super) fn fetch(&self) -> Result<Option<SessionRecord>, SessionError> {
        let Some(doc) = self.store.get(&self.seat.key)? else {
            return Ok(None);
        };
        let record = SessionRecord::from_document(doc).map_err(|source| {
            SessionError::Malformed {
                key: self.seat.key.clone(),
                source,
            }
        })?;
        if !record.is_hosted_by(&self.seat.token) {
            return Err(SessionError::Replaced(self.seat.room.to_string()));
        }
        Ok(Some(record))
    }

    /// [`fetch`](Self::fetch), detaching once the room turns out to be
    /// someone else's.
    pub(super) fn fetch_attached(&mut self) -> Result<Option<SessionRecord>, SessionError> {
        let fetched = self.fetch();
        if matches!(fetched, Err(SessionError::Replaced(_))) {
            warn!(room = %self.seat.room, "room reclaimed by another host, detaching");
            self.leave();
        }
        fetched
    }

    pub(super) fn room_code(&self) -> &str {
        self.seat.room.as_str()
    }

    fn reject(&self, reason: RejectReason) -> Submission {
        debug!(room = %self.seat.room, side = %self.seat.side, %reason, "submission rejected");
        Submission::Rejected(reason)
    }

    fn require_authority(&self, op: &'static str) -> Result<(), SessionError> {
        match self.role() {
            Role::Authority => Ok(()),
            Role::Observer => Err(SessionError::NotAuthority(op)),
        }
    }
}
