//! # Stickfight Core
//!
//! Session synchronization and turn resolution for two-player Stickfight
//! duels.
//!
//! Two peers play simultaneous-choice turns. Each picks an action; once both
//! are in, the host resolves the turn and publishes the result. Peers stay in
//! step either through a shared record store or, on one machine, through a
//! push channel.
//!
//! ## Architecture
//!
//! - **[`rules`]**: action and buff tables, with a standard and a classic
//!   preset, loadable from JSON
//! - **[`resolver`]**: the pure turn arithmetic over both sides' state and an
//!   injected random source
//! - **[`session`]**: session records, id allocation, and the
//!   authority/observer participant that keeps one side in sync
//! - **[`local`]**: the same game over a broadcast channel, host-pushed
//!
//! ## Usage
//!
//! ```
//! use stickfight_core::rules::ActionId;
//! use stickfight_core::session::{SessionBuilder, SessionListener, TurnResolved};
//! use stickfight_store::MemoryStore;
//!
//! struct Log(Vec<i32>);
//!
//! impl SessionListener for Log {
//!     fn on_turn_resolved(&mut self, turn: &TurnResolved) {
//!         self.0.push(turn.hp_after.guest);
//!     }
//! }
//!
//! let store = MemoryStore::new();
//! let (mut host, allocation) = SessionBuilder::new().host(store.clone(), "Ann", "").unwrap();
//! assert_eq!(allocation.session_id.as_str(), "room-1");
//!
//! let mut guest = SessionBuilder::new()
//!     .join(store, "Bob", "room-1")
//!     .unwrap()
//!     .into_participant()
//!     .unwrap();
//! host.poll().unwrap();
//! guest.poll().unwrap();
//!
//! let _ = host.submit_action(&ActionId::new("heavy")).unwrap();
//! let _ = guest.submit_action(&ActionId::new("block")).unwrap();
//! host.poll().unwrap();
//!
//! let mut log = Log(Vec::new());
//! log.dispatch_all(&guest.poll().unwrap());
//! assert_eq!(log.0.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod local;
pub mod resolver;
pub mod rules;
pub mod session;
pub mod side;

pub use config::SessionConfig;
pub use error::SessionError;
pub use resolver::{TurnOutcome, TurnResolver};
pub use rules::{ActionId, Ruleset};
pub use session::{Participant, SessionBuilder, SessionEvent, Submission};
pub use side::Side;

#[cfg(test)]
mod tests;
