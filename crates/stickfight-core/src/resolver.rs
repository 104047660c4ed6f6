//! Turn resolver: the authoritative combat arithmetic.
//!
//! [`TurnResolver::resolve`] is a pure function of the two chosen actions,
//! both sides' state, the ruleset and an injected random source. It performs
//! no I/O and never touches a session record; the authority writes its
//! outcome, observers only ever read the result.
//!
//! # Processing Order
//!
//! 1. Each attacking side rolls once (host first, then guest). Hit chance is
//!    the attack's base chance plus the attacker's active hit bonuses,
//!    capped at 1. Under [`BlockRule::Hard`] an attack into `block` is not
//!    eligible and draws no roll.
//! 2. A hit deals the attack's damage, reduced by the defender's strongest
//!    active defense fraction and rounded up. Reduced damage is never zero
//!    unless the raw damage was zero.
//! 3. Healing items restore HP after all damage.
//! 4. Existing cooldowns and buffs tick down by one; expired entries drop.
//! 5. Buff items register their buff for the following turns.
//! 6. The used action's cooldown is applied to the ticked map, so it is
//!    unavailable for its full length.
//! 7. Both HP values are clamped to `[0, max_hp]`.
//!
//! # Example
//!
//! ```
//! use rand::rngs::mock::StepRng;
//! use stickfight_core::resolver::{TurnInput, TurnResolver};
//! use stickfight_core::rules::{ActionId, Ruleset};
//! use stickfight_core::side::{PerSide, SideState, Side};
//!
//! let rules = Ruleset::standard();
//! let input = TurnInput {
//!     actions: PerSide::new(ActionId::new("heavy"), ActionId::new("block")),
//!     state: PerSide::new(SideState::fresh(100), SideState::fresh(100)),
//! };
//!
//! // A zero roll always hits.
//! let outcome = TurnResolver::new(&rules).resolve(&input, &mut StepRng::new(0, 0));
//! assert_eq!(outcome.state.guest.hp, 72);
//! assert_eq!(outcome.state.host.cooldowns.remaining(&ActionId::new("heavy")), 2);
//! assert_eq!(outcome.hp_delta(Side::Guest), -28);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::rules::{ActionKind, ActionId, BlockRule, BuffId, Ruleset};
use crate::side::{Buffs, PerSide, Side, SideState};

/// Tolerance applied before rounding reduced damage up, so that products
/// such as `12 * 0.5` never round to 7 through float error.
const ROUNDING_EPSILON: f64 = 1e-9;

/// The two submitted actions and both sides' state at turn start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnInput {
    /// Action chosen by each side.
    pub actions: PerSide<ActionId>,
    /// HP, cooldowns and buffs of each side before resolution.
    pub state: PerSide<SideState>,
}

/// What one side's attack did this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Strike {
    /// The side did not attack.
    None,
    /// The attack was negated by a hard block; no roll was drawn.
    Blocked,
    /// The roll missed.
    Missed,
    /// The roll hit for `damage` after mitigation.
    Hit {
        /// Damage applied to the defender.
        damage: i32,
    },
}

/// Per-side summary of a resolved turn, for presentation and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    /// The resolved action.
    pub action: ActionId,
    /// Result of the side's attack, if any.
    pub strike: Strike,
    /// HP restored by an item.
    pub healed: i32,
    /// Buff granted by an item.
    pub buff_granted: Option<BuffId>,
}

/// Result of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// HP of each side before resolution.
    pub hp_before: PerSide<i32>,
    /// Final state of each side, HP clamped.
    pub state: PerSide<SideState>,
    /// What each side did.
    pub reports: PerSide<TurnReport>,
}

impl TurnOutcome {
    /// HP change for `side` (negative for net damage).
    #[must_use]
    pub fn hp_delta(&self, side: Side) -> i32 {
        self.state.get(side).hp - self.hp_before.get(side)
    }

    /// Final HP of both sides.
    #[must_use]
    pub fn hp_after(&self) -> PerSide<i32> {
        PerSide::new(self.state.host.hp, self.state.guest.hp)
    }

    /// Returns `true` if either side is at 0 HP.
    #[must_use]
    pub fn is_decisive(&self) -> bool {
        self.state.host.hp <= 0 || self.state.guest.hp <= 0
    }
}

/// Applies a [`Ruleset`] to a pair of actions.
#[derive(Debug, Clone, Copy)]
pub struct TurnResolver<'a> {
    rules: &'a Ruleset,
}

impl<'a> TurnResolver<'a> {
    /// Creates a resolver over `rules`.
    #[must_use]
    pub const fn new(rules: &'a Ruleset) -> Self {
        Self { rules }
    }

    /// Resolves one turn.
    ///
    /// Unrecognized actions resolve as no-ops with no cooldown.
    pub fn resolve<R: Rng + ?Sized>(&self, input: &TurnInput, rng: &mut R) -> TurnOutcome {
        let hp_before = PerSide::new(input.state.host.hp, input.state.guest.hp);
        let mut hp = hp_before;
        let mut reports = PerSide::new(
            self.blank_report(&input.actions.host),
            self.blank_report(&input.actions.guest),
        );

        // Damage, host roll first.
        for attacker in [Side::Host, Side::Guest] {
            let strike = self.strike(input, attacker, rng);
            if let Strike::Hit { damage } = strike {
                *hp.get_mut(attacker.opponent()) -= damage;
            }
            reports.get_mut(attacker).strike = strike;
        }

        // Healing lands after damage.
        for side in [Side::Host, Side::Guest] {
            if let Some(ActionKind::Item { heal, .. }) = self.kind_of(input.actions.get(side)) {
                *hp.get_mut(side) += heal;
                reports.get_mut(side).healed = *heal;
            }
        }

        let state = PerSide::new(
            self.next_state(input, Side::Host, hp.host, &mut reports.host),
            self.next_state(input, Side::Guest, hp.guest, &mut reports.guest),
        );

        trace!(
            host_action = %input.actions.host,
            guest_action = %input.actions.guest,
            host_hp = state.host.hp,
            guest_hp = state.guest.hp,
            "turn resolved"
        );

        TurnOutcome {
            hp_before,
            state,
            reports,
        }
    }

    fn blank_report(&self, action: &ActionId) -> TurnReport {
        if !self.rules.recognizes(action) {
            warn!(%action, "resolving unrecognized action as no-op");
        }
        TurnReport {
            action: action.clone(),
            strike: Strike::None,
            healed: 0,
            buff_granted: None,
        }
    }

    fn kind_of(&self, action: &ActionId) -> Option<&ActionKind> {
        self.rules.action(action).map(|rule| &rule.kind)
    }

    fn strike<R: Rng + ?Sized>(&self, input: &TurnInput, attacker: Side, rng: &mut R) -> Strike {
        let Some(ActionKind::Attack { damage, hit_chance }) =
            self.kind_of(input.actions.get(attacker))
        else {
            return Strike::None;
        };

        let defender = attacker.opponent();
        if self.rules.block == BlockRule::Hard {
            let blocked = self
                .rules
                .action(input.actions.get(defender))
                .is_some_and(|rule| rule.is_block());
            if blocked {
                return Strike::Blocked;
            }
        }

        let chance = (hit_chance + self.hit_bonus(&input.state.get(attacker).buffs)).min(1.0);
        let roll: f64 = rng.gen();
        if roll >= chance {
            return Strike::Missed;
        }

        let defense = self.defense(&input.state.get(defender).buffs);
        Strike::Hit {
            damage: mitigate(*damage, defense),
        }
    }

    fn hit_bonus(&self, buffs: &Buffs) -> f64 {
        buffs
            .iter()
            .filter_map(|(id, _)| self.rules.buff(id))
            .map(|rule| rule.hit_bonus)
            .sum()
    }

    fn defense(&self, buffs: &Buffs) -> f64 {
        buffs
            .iter()
            .filter_map(|(id, _)| self.rules.buff(id))
            .map(|rule| rule.defense)
            .fold(0.0, f64::max)
    }

    fn next_state(
        &self,
        input: &TurnInput,
        side: Side,
        hp: i32,
        report: &mut TurnReport,
    ) -> SideState {
        let before = input.state.get(side);
        let action = input.actions.get(side);

        let mut cooldowns = before.cooldowns.clone();
        let mut buffs = before.buffs.clone();
        cooldowns.tick();
        buffs.tick();

        if let Some(rule) = self.rules.action(action) {
            if let ActionKind::Item {
                buff: Some(buff),
                duration,
                ..
            } = &rule.kind
            {
                buffs.set(buff.clone(), *duration);
                report.buff_granted = Some(buff.clone());
            }
            cooldowns.set(action.clone(), rule.cooldown);
        }

        SideState {
            hp: hp.clamp(0, self.rules.max_hp),
            cooldowns,
            buffs,
        }
    }
}

/// Applies a defense fraction to raw damage, rounding up.
///
/// Positive raw damage never mitigates below 1.
#[must_use]
pub fn mitigate(raw: i32, defense: f64) -> i32 {
    if raw <= 0 || defense <= 0.0 {
        return raw.max(0);
    }
    let reduced = f64::from(raw) * (1.0 - defense.min(1.0)) - ROUNDING_EPSILON;
    #[allow(clippy::cast_possible_truncation)]
    let reduced = reduced.ceil() as i32;
    reduced.clamp(1, raw)
}
