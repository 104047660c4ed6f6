//! Session configuration.
//!
//! Plain data with sensible defaults; every field can be overridden from
//! JSON.
//!
//! ```
//! use stickfight_core::config::SessionConfig;
//!
//! let config = SessionConfig::from_json(r#"{ "max_suffix_attempts": 5 }"#).unwrap();
//! assert_eq!(config.max_suffix_attempts, 5);
//! assert_eq!(config.key_prefix, "stickfight_");
//! ```

use serde::{Deserialize, Serialize};

/// Prefix for session record keys.
pub const KEY_PREFIX: &str = "stickfight_";

/// Room used when the requested name is blank.
pub const DEFAULT_ROOM: &str = "room-1";

/// Deterministic candidates tried before falling back to random suffixes.
pub const MAX_SUFFIX_ATTEMPTS: usize = 50;

/// Length of a random fallback suffix.
pub const RANDOM_SUFFIX_LEN: usize = 5;

/// Random candidates tried before allocation gives up.
pub const RANDOM_FALLBACK_ATTEMPTS: usize = 16;

/// Tunables for session allocation and participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix joining a room code into a record key.
    pub key_prefix: String,
    /// Room used for blank requests.
    pub default_room: String,
    /// Deterministic candidates (`name`, `name-2`, ...) to try.
    pub max_suffix_attempts: usize,
    /// Characters in a random fallback suffix.
    pub random_suffix_len: usize,
    /// Random candidates to try once deterministic ones are exhausted.
    pub random_fallback_attempts: usize,
    /// Seed for the participant's RNG; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_prefix: KEY_PREFIX.to_string(),
            default_room: DEFAULT_ROOM.to_string(),
            max_suffix_attempts: MAX_SUFFIX_ATTEMPTS,
            random_suffix_len: RANDOM_SUFFIX_LEN,
            random_fallback_attempts: RANDOM_FALLBACK_ATTEMPTS,
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Parses a configuration, filling omitted fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Record key for a room code.
    #[must_use]
    pub fn record_key(&self, room: &str) -> String {
        format!("{}{}", self.key_prefix, room)
    }

    /// Room code for a record key, if it carries this config's prefix.
    #[must_use]
    pub fn room_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.key_prefix.as_str())
    }
}
