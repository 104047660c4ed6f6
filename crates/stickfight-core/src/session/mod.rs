//! Session synchronization over a shared record store.
//!
//! Two participants share one [`SessionRecord`] per match. The host
//! creates it and acts as the **authority**: it promotes the session once a
//! guest sits down, resolves each turn once both actions are in, and owns
//! reset and teardown. The guest is an **observer**: it writes only its own
//! action and reacts to resolutions by watching `lastResolvedMark`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   update(own action)   ┌──────────────┐
//! │  Observer    │ ─────────────────────► │              │
//! │  (guest)     │ ◄───── snapshots ───── │ RecordStore  │
//! └──────────────┘                        │              │
//! ┌──────────────┐ ◄───── snapshots ───── │              │
//! │  Authority   │ ─────────────────────► │              │
//! │  (host)      │  update(resolution)    └──────────────┘
//! └──────────────┘
//! ```
//!
//! Both roles share [`Participant`]; each snapshot is routed to the
//! role-specific step exactly once at [`Participant::handle_snapshot`].
//!
//! # Example
//!
//! ```
//! use stickfight_core::rules::ActionId;
//! use stickfight_core::session::{SessionBuilder, SessionEvent, Submission};
//! use stickfight_store::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let (mut host, allocation) = SessionBuilder::new()
//!     .seed(1)
//!     .host(store.clone(), "Ann", "dojo")
//!     .unwrap();
//! let mut guest = SessionBuilder::new()
//!     .join(store.clone(), "Bob", allocation.session_id.as_str())
//!     .unwrap()
//!     .into_participant()
//!     .unwrap();
//!
//! host.poll().unwrap();
//! guest.poll().unwrap();
//!
//! let light = ActionId::new("light");
//! assert_eq!(host.submit_action(&light).unwrap(), Submission::Accepted);
//! assert_eq!(guest.submit_action(&light).unwrap(), Submission::Accepted);
//! host.poll().unwrap();
//!
//! let events = guest.poll().unwrap();
//! assert!(events.iter().any(|e| matches!(e, SessionEvent::TurnResolved(_))));
//! ```

mod authority;
pub mod events;
mod mirror;
mod observer;
pub mod participant;
pub mod patch;
pub mod record;
pub mod registry;

use std::fmt;

use crate::rules::ActionId;
use crate::side::Side;

pub use events::{EndReason, SessionEvent, SessionListener, SessionView, TurnResolved};
pub use participant::{JoinOutcome, Participant, SessionBuilder};
pub use patch::SessionPatch;
pub use record::{ActionSlot, ResolutionMark, SessionRecord, SessionState};
pub use registry::{Allocation, SessionId, SessionRegistry};

/// Which half of the protocol a participant runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sole writer of HP, timers, turn and resolution mark.
    Authority,
    /// Writes only its own action field.
    Observer,
}

impl Role {
    /// The role that plays `side`.
    #[must_use]
    pub const fn of(side: Side) -> Self {
        match side {
            Side::Host => Self::Authority,
            Side::Guest => Self::Observer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authority => "authority",
            Self::Observer => "observer",
        })
    }
}

/// Result of an action submission.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Submission {
    /// The action was written to the shared record.
    Accepted,
    /// The submission was dropped. The store is unchanged.
    Rejected(RejectReason),
}

impl Submission {
    /// Returns `true` if the action was written.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Why a submission was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The session is not accepting actions from this side right now.
    NotPlaying(SessionState),
    /// This side already has an action in for the current turn.
    AlreadySubmitted(ActionId),
    /// The action is still cooling down.
    OnCooldown {
        /// The rejected action.
        action: ActionId,
        /// Turns left.
        remaining: u32,
    },
    /// The session record no longer exists.
    SessionMissing,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPlaying(state) => write!(f, "session is {state}"),
            Self::AlreadySubmitted(action) => write!(f, "{action} already submitted"),
            Self::OnCooldown { action, remaining } => {
                write!(f, "{action} on cooldown for {remaining} more turns")
            }
            Self::SessionMissing => f.write_str("session record is gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_authority() {
        assert_eq!(Role::of(Side::Host), Role::Authority);
        assert_eq!(Role::of(Side::Guest), Role::Observer);
    }

    #[test]
    fn reject_reason_display() {
        let reason = RejectReason::OnCooldown {
            action: ActionId::new("heavy"),
            remaining: 2,
        };
        assert_eq!(reason.to_string(), "heavy on cooldown for 2 more turns");
        assert!(!Submission::Rejected(reason).is_accepted());
    }
}
