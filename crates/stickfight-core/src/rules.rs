//! Combat rules table.
//!
//! A [`Ruleset`] is pure configuration: per-action damage, hit probability,
//! cooldown, healing and buff grants, plus per-buff effects. It holds no
//! state and is shared identically by both peers.
//!
//! # Block Semantics
//!
//! Every ruleset names exactly one [`BlockRule`]:
//!
//! - [`BlockRule::Hard`]: an attack against a side that chose `block` is
//!   not eligible to hit at all (no roll is drawn)
//! - [`BlockRule::DefenseOnly`]: `block` is a selectable action with no
//!   combat effect; damage reduction only comes from defense buffs
//!
//! The resolver applies the named rule and never combines the two.
//!
//! # Example
//!
//! ```
//! use stickfight_core::rules::{ActionId, BlockRule, Ruleset};
//!
//! let rules = Ruleset::standard();
//! assert_eq!(rules.block, BlockRule::DefenseOnly);
//! assert_eq!(rules.action(&ActionId::new("heavy")).unwrap().cooldown, 2);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a selectable action (`"light"`, `"item"`, `"block"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Creates a new `ActionId` from a string.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Returns the action ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a timed buff (`"defense_buff"`, `"speed_boost"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuffId(String);

impl BuffId {
    /// Creates a new `BuffId` from a string.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Returns the buff ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BuffId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Rules
// =============================================================================

/// What an action does when resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Deals `damage` to the opponent with probability `hit_chance`.
    Attack {
        /// Raw damage on hit.
        damage: i32,
        /// Base hit probability in `[0, 1]`.
        hit_chance: f64,
    },
    /// Heals the user and/or grants a timed buff.
    Item {
        /// HP restored, applied after damage.
        #[serde(default)]
        heal: i32,
        /// Buff granted for the following turns.
        #[serde(default)]
        buff: Option<BuffId>,
        /// Buff duration in turns.
        #[serde(default)]
        duration: u32,
    },
    /// Guards. Effect depends on the ruleset's [`BlockRule`].
    Block,
    /// Flees. No combat effect.
    Run,
}

/// One row of the rules table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    /// The action's effect.
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Turns the action stays unavailable after use (0 = never).
    #[serde(default)]
    pub cooldown: u32,
}

impl ActionRule {
    /// An attack row.
    #[must_use]
    pub fn attack(damage: i32, hit_chance: f64, cooldown: u32) -> Self {
        Self {
            kind: ActionKind::Attack { damage, hit_chance },
            cooldown,
        }
    }

    /// A healing item row.
    #[must_use]
    pub fn heal(heal: i32, cooldown: u32) -> Self {
        Self {
            kind: ActionKind::Item {
                heal,
                buff: None,
                duration: 0,
            },
            cooldown,
        }
    }

    /// A buff-granting item row.
    #[must_use]
    pub fn buff(buff: &str, duration: u32, cooldown: u32) -> Self {
        Self {
            kind: ActionKind::Item {
                heal: 0,
                buff: Some(BuffId::new(buff)),
                duration,
            },
            cooldown,
        }
    }

    /// A block row.
    #[must_use]
    pub fn block() -> Self {
        Self {
            kind: ActionKind::Block,
            cooldown: 0,
        }
    }

    /// A run row.
    #[must_use]
    pub fn run() -> Self {
        Self {
            kind: ActionKind::Run,
            cooldown: 0,
        }
    }

    /// Returns `true` for attack rows.
    #[must_use]
    pub const fn is_attack(&self) -> bool {
        matches!(self.kind, ActionKind::Attack { .. })
    }

    /// Returns `true` for block rows.
    #[must_use]
    pub const fn is_block(&self) -> bool {
        matches!(self.kind, ActionKind::Block)
    }
}

/// Effect of an active buff.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BuffRule {
    /// Added to the holder's hit probability.
    #[serde(default)]
    pub hit_bonus: f64,
    /// Fraction of incoming damage removed, in `[0, 1]`.
    #[serde(default)]
    pub defense: f64,
}

/// How `block` interacts with attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRule {
    /// Blocking makes the opponent's attack ineligible.
    Hard,
    /// Blocking has no listed effect.
    #[default]
    DefenseOnly,
}

/// Errors from loading or validating a [`Ruleset`].
#[derive(Debug, Error)]
pub enum RulesError {
    /// The JSON could not be parsed.
    #[error("invalid ruleset json: {0}")]
    Parse(#[from] serde_json::Error),

    /// The ruleset file could not be read.
    #[error("cannot read ruleset {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Maximum HP must be positive.
    #[error("max_hp must be positive, got {0}")]
    InvalidMaxHp(i32),

    /// A hit chance or defense fraction is outside `[0, 1]`.
    #[error("{field} of {id} must be within [0, 1], got {value}")]
    OutOfRange {
        /// Action or buff id.
        id: String,
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Damage or heal amounts must not be negative.
    #[error("{field} of {id} must not be negative, got {value}")]
    NegativeAmount {
        /// Action id.
        id: ActionId,
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: i32,
    },

    /// An item grants a buff the ruleset does not define.
    #[error("action {action} grants undefined buff {buff}")]
    UnknownBuff {
        /// Action id.
        action: ActionId,
        /// Missing buff id.
        buff: BuffId,
    },

    /// A buff-granting item has zero duration.
    #[error("action {0} grants a buff with zero duration")]
    ZeroDuration(ActionId),

    /// The ruleset defines no actions.
    #[error("ruleset defines no actions")]
    Empty,
}

/// The complete combat configuration shared by both peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// HP ceiling; also the starting HP of a fresh session.
    #[serde(default = "default_max_hp")]
    pub max_hp: i32,
    /// Block semantics for this ruleset.
    #[serde(default)]
    pub block: BlockRule,
    /// Action table.
    pub actions: BTreeMap<ActionId, ActionRule>,
    /// Buff table.
    #[serde(default)]
    pub buffs: BTreeMap<BuffId, BuffRule>,
}

fn default_max_hp() -> i32 {
    100
}

impl Ruleset {
    /// The full ruleset: three attacks, healing, two buff items, block and run.
    ///
    /// Block is [`BlockRule::DefenseOnly`].
    #[must_use]
    pub fn standard() -> Self {
        let mut actions = BTreeMap::new();
        actions.insert(ActionId::new("light"), ActionRule::attack(12, 0.9, 0));
        actions.insert(ActionId::new("heavy"), ActionRule::attack(28, 0.65, 2));
        actions.insert(ActionId::new("special"), ActionRule::attack(40, 0.5, 3));
        actions.insert(ActionId::new("block"), ActionRule::block());
        actions.insert(ActionId::new("item"), ActionRule::heal(18, 1));
        actions.insert(ActionId::new("shield"), ActionRule::buff("defense_buff", 2, 3));
        actions.insert(ActionId::new("focus"), ActionRule::buff("speed_boost", 2, 3));
        actions.insert(ActionId::new("run"), ActionRule::run());

        let mut buffs = BTreeMap::new();
        buffs.insert(
            BuffId::new("defense_buff"),
            BuffRule {
                hit_bonus: 0.0,
                defense: 0.5,
            },
        );
        buffs.insert(
            BuffId::new("speed_boost"),
            BuffRule {
                hit_bonus: 0.2,
                defense: 0.0,
            },
        );

        Self {
            name: "standard".to_string(),
            max_hp: default_max_hp(),
            block: BlockRule::DefenseOnly,
            actions,
            buffs,
        }
    }

    /// The original four-button ruleset: attack, block, item, run.
    ///
    /// Block is [`BlockRule::Hard`].
    #[must_use]
    pub fn classic() -> Self {
        let mut actions = BTreeMap::new();
        actions.insert(ActionId::new("attack"), ActionRule::attack(20, 0.8, 0));
        actions.insert(ActionId::new("block"), ActionRule::block());
        actions.insert(ActionId::new("item"), ActionRule::heal(10, 0));
        actions.insert(ActionId::new("run"), ActionRule::run());

        Self {
            name: "classic".to_string(),
            max_hp: default_max_hp(),
            block: BlockRule::Hard,
            actions,
            buffs: BTreeMap::new(),
        }
    }

    /// Parses and validates a ruleset from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::Parse`] for malformed JSON and a validation
    /// error for inconsistent tables.
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let rules: Self = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Reads, parses and validates a ruleset file.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::Io`] if the file cannot be read, otherwise as
    /// [`Ruleset::from_json`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks table consistency.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found, in action-id order.
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.max_hp <= 0 {
            return Err(RulesError::InvalidMaxHp(self.max_hp));
        }
        if self.actions.is_empty() {
            return Err(RulesError::Empty);
        }
        for (id, rule) in &self.actions {
            match &rule.kind {
                ActionKind::Attack { damage, hit_chance } => {
                    check_unit(id.as_str(), "hit_chance", *hit_chance)?;
                    check_amount(id, "damage", *damage)?;
                }
                ActionKind::Item {
                    heal,
                    buff,
                    duration,
                } => {
                    check_amount(id, "heal", *heal)?;
                    if let Some(buff) = buff {
                        if !self.buffs.contains_key(buff) {
                            return Err(RulesError::UnknownBuff {
                                action: id.clone(),
                                buff: buff.clone(),
                            });
                        }
                        if *duration == 0 {
                            return Err(RulesError::ZeroDuration(id.clone()));
                        }
                    }
                }
                ActionKind::Block | ActionKind::Run => {}
            }
        }
        for (id, rule) in &self.buffs {
            check_unit(id.as_str(), "defense", rule.defense)?;
            check_unit(id.as_str(), "hit_bonus", rule.hit_bonus)?;
        }
        Ok(())
    }

    /// Looks up an action row.
    #[must_use]
    pub fn action(&self, id: &ActionId) -> Option<&ActionRule> {
        self.actions.get(id)
    }

    /// Looks up a buff row.
    #[must_use]
    pub fn buff(&self, id: &BuffId) -> Option<&BuffRule> {
        self.buffs.get(id)
    }

    /// Returns `true` if `id` is a recognized action.
    #[must_use]
    pub fn recognizes(&self, id: &ActionId) -> bool {
        self.actions.contains_key(id)
    }

    /// Recognized action ids in table order.
    pub fn action_ids(&self) -> impl Iterator<Item = &ActionId> {
        self.actions.keys()
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::standard()
    }
}

fn check_unit(id: &str, field: &'static str, value: f64) -> Result<(), RulesError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RulesError::OutOfRange {
            id: id.to_string(),
            field,
            value,
        })
    }
}

fn check_amount(id: &ActionId, field: &'static str, value: i32) -> Result<(), RulesError> {
    if value < 0 {
        Err(RulesError::NegativeAmount {
            id: id.clone(),
            field,
            value,
        })
    } else {
        Ok(())
    }
}
