//! Admission configuration.

use crate::db::config::parse_env_or;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Expiry of the (contest, user) admission lock in seconds (default: 10)
    pub lock_ttl_secs: u64,

    /// Unfilled rooms a user may wait in within one contest (default: 3)
    pub max_unfilled_rooms: i64,

    /// Candidate rooms tried under lock before allocating a new one (default: 3)
    pub matchmaker_retries: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 10,
            max_unfilled_rooms: 3,
            matchmaker_retries: 3,
        }
    }
}

impl AdmissionConfig {
    /// Load from `ADMISSION_LOCK_TTL_SECS`, `ADMISSION_MAX_UNFILLED_ROOMS`
    /// and `MATCHMAKER_RETRIES`
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            lock_ttl_secs: parse_env_or("ADMISSION_LOCK_TTL_SECS", d.lock_ttl_secs),
            max_unfilled_rooms: parse_env_or("ADMISSION_MAX_UNFILLED_ROOMS", d.max_unfilled_rooms),
            matchmaker_retries: parse_env_or("MATCHMAKER_RETRIES", d.matchmaker_retries),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lock_ttl_secs == 0 {
            return Err("admission lock TTL must be greater than zero".to_string());
        }
        if self.max_unfilled_rooms < 1 {
            return Err("max unfilled rooms must be at least 1".to_string());
        }
        if self.matchmaker_retries == 0 {
            return Err("matchmaker retries must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}
