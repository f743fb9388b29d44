//! Draft timing and economy configuration.

use crate::db::config::parse_env_or;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("quick skip limit ({quick_skip}s) must not exceed the turn limit ({turn}s)")]
    QuickSkipTooLong { quick_skip: u64, turn: u64 },

    #[error("starting budget must be positive, got {0}")]
    InvalidBudget(i64),

    #[error("{0} must not be negative")]
    Negative(&'static str),
}

/// Draft configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftConfig {
    /// Standard pick time limit in seconds (default: 30)
    pub turn_limit_secs: u64,

    /// Pick time limit when the acting team has no budget left (default: 3)
    pub quick_skip_secs: u64,

    /// Grace period after a timer expires before auto-pick (default: 2)
    pub grace_secs: u64,

    /// Countdown before the board is revealed (default: 5)
    pub launch_countdown_secs: u64,

    /// Countdown between the board reveal and the first turn (default: 3)
    pub first_turn_countdown_secs: u64,

    /// Stall sweep interval (default: 10)
    pub sweep_interval_secs: u64,

    /// Extra time past a turn's limit before the sweep auto-picks (default: 5)
    pub stall_buffer_secs: u64,

    /// Expiry of the per-user pick-in-flight lock (default: 3)
    pub pick_lock_secs: u64,

    /// Lifetime of an active draft record (default: 6 hours)
    pub active_ttl_secs: u64,

    /// Lifetime of a completed draft record (default: 1 hour)
    pub completed_ttl_secs: u64,

    /// Budget each team starts with (default: 15)
    pub starting_budget: i64,

    /// One-time bonus credited per completed entry (default: 100)
    pub completion_bonus: i64,

    /// Delay between a room filling and its launch (default: 1)
    pub launch_delay_secs: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            turn_limit_secs: 30,
            quick_skip_secs: 3,
            grace_secs: 2,
            launch_countdown_secs: 5,
            first_turn_countdown_secs: 3,
            sweep_interval_secs: 10,
            stall_buffer_secs: 5,
            pick_lock_secs: 3,
            active_ttl_secs: 6 * 60 * 60,
            completed_ttl_secs: 60 * 60,
            starting_budget: super::models::STARTING_BUDGET,
            completion_bonus: 100,
            launch_delay_secs: 1,
        }
    }
}

impl DraftConfig {
    /// Load from environment variables, falling back to defaults
    ///
    /// Variables: `DRAFT_TURN_SECS`, `DRAFT_QUICK_SKIP_SECS`, `DRAFT_GRACE_SECS`,
    /// `DRAFT_LAUNCH_COUNTDOWN_SECS`, `DRAFT_FIRST_TURN_COUNTDOWN_SECS`,
    /// `DRAFT_SWEEP_SECS`, `DRAFT_STALL_BUFFER_SECS`, `DRAFT_PICK_LOCK_SECS`,
    /// `DRAFT_ACTIVE_TTL_SECS`, `DRAFT_COMPLETED_TTL_SECS`, `DRAFT_BUDGET`,
    /// `DRAFT_COMPLETION_BONUS`, `DRAFT_LAUNCH_DELAY_SECS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            turn_limit_secs: parse_env_or("DRAFT_TURN_SECS", d.turn_limit_secs),
            quick_skip_secs: parse_env_or("DRAFT_QUICK_SKIP_SECS", d.quick_skip_secs),
            grace_secs: parse_env_or("DRAFT_GRACE_SECS", d.grace_secs),
            launch_countdown_secs: parse_env_or(
                "DRAFT_LAUNCH_COUNTDOWN_SECS",
                d.launch_countdown_secs,
            ),
            first_turn_countdown_secs: parse_env_or(
                "DRAFT_FIRST_TURN_COUNTDOWN_SECS",
                d.first_turn_countdown_secs,
            ),
            sweep_interval_secs: parse_env_or("DRAFT_SWEEP_SECS", d.sweep_interval_secs),
            stall_buffer_secs: parse_env_or("DRAFT_STALL_BUFFER_SECS", d.stall_buffer_secs),
            pick_lock_secs: parse_env_or("DRAFT_PICK_LOCK_SECS", d.pick_lock_secs),
            active_ttl_secs: parse_env_or("DRAFT_ACTIVE_TTL_SECS", d.active_ttl_secs),
            completed_ttl_secs: parse_env_or("DRAFT_COMPLETED_TTL_SECS", d.completed_ttl_secs),
            starting_budget: parse_env_or("DRAFT_BUDGET", d.starting_budget),
            completion_bonus: parse_env_or("DRAFT_COMPLETION_BONUS", d.completion_bonus),
            launch_delay_secs: parse_env_or("DRAFT_LAUNCH_DELAY_SECS", d.launch_delay_secs),
        }
    }

    /// Check the configuration for values the scheduler cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.turn_limit_secs == 0 {
            return Err(ConfigError::ZeroDuration("turn limit"));
        }
        if self.quick_skip_secs == 0 {
            return Err(ConfigError::ZeroDuration("quick skip limit"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("sweep interval"));
        }
        if self.pick_lock_secs == 0 {
            return Err(ConfigError::ZeroDuration("pick lock"));
        }
        if self.quick_skip_secs > self.turn_limit_secs {
            return Err(ConfigError::QuickSkipTooLong {
                quick_skip: self.quick_skip_secs,
                turn: self.turn_limit_secs,
            });
        }
        if self.starting_budget <= 0 {
            return Err(ConfigError::InvalidBudget(self.starting_budget));
        }
        if self.completion_bonus < 0 {
            return Err(ConfigError::Negative("completion bonus"));
        }
        Ok(())
    }

    pub fn turn_limit(&self) -> Duration {
        Duration::from_secs(self.turn_limit_secs)
    }

    pub fn quick_skip(&self) -> Duration {
        Duration::from_secs(self.quick_skip_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stall_buffer(&self) -> Duration {
        Duration::from_secs(self.stall_buffer_secs)
    }

    pub fn pick_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.pick_lock_secs)
    }

    pub fn active_ttl(&self) -> Duration {
        Duration::from_secs(self.active_ttl_secs)
    }

    pub fn completed_ttl(&self) -> Duration {
        Duration::from_secs(self.completed_ttl_secs)
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_secs(self.launch_delay_secs)
    }

    /// Time limit for a team with `budget` remaining
    pub fn limit_for_budget(&self, budget: i64) -> u64 {
        if budget <= 0 {
            self.quick_skip_secs
        } else {
            self.turn_limit_secs
        }
    }
}
