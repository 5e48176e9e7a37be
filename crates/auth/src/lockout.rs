//! Failed-login lockout state machine.
//!
//! Every user record carries a failure counter, the time of the last failure
//! and a `locked` flag. Credential checks drive the transitions:
//!
//! ```text
//!            failure (count < max)            failure (count >= max)
//!   Active ─────────────────────────▶ Active ─────────────────────────▶ Locked
//!     ▲                                                                    │
//!     │ success / manual unlock / stale failure (auto-unlock)              │
//!     └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure arriving after the window has elapsed starts counting from zero
//! again. While locked, credential checks short-circuit before any password
//! comparison unless auto-unlock is enabled and the window has elapsed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lockout configuration, passed explicitly to every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Consecutive failures (within the window) that lock the account.
    pub max_fails: u32,
    /// Length of the failure window in milliseconds.
    pub fail_window_ms: u64,
    /// Whether a lock lifts by itself once the window has elapsed.
    pub auto_unlock: bool,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_fails: 5,
            fail_window_ms: 15 * 60 * 1000,
            auto_unlock: true,
        }
    }
}

impl LockoutPolicy {
    pub fn fail_window(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.fail_window_ms).unwrap_or(i64::MAX))
    }
}

/// Coarse state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Active,
    Locked,
}

/// Per-user lockout fields, persisted alongside the user record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    pub fail_count: u32,
    pub fail_time: Option<DateTime<Utc>>,
    pub locked: bool,
}

impl LockoutState {
    pub fn status(&self) -> LockStatus {
        if self.locked {
            LockStatus::Locked
        } else {
            LockStatus::Active
        }
    }

    /// More than one window has passed since the last recorded failure.
    pub fn window_elapsed(&self, policy: &LockoutPolicy, now: DateTime<Utc>) -> bool {
        self.fail_time
            .is_some_and(|at| now - at > policy.fail_window())
    }

    /// The previous failures no longer count toward the next one.
    ///
    /// A lock only goes stale under auto-unlock; otherwise it holds until a
    /// manual [`unlock`](Self::unlock).
    pub fn is_stale(&self, policy: &LockoutPolicy, now: DateTime<Utc>) -> bool {
        (policy.auto_unlock || !self.locked) && self.window_elapsed(policy, now)
    }

    /// Gate evaluated before any credential comparison.
    pub fn admits(&self, policy: &LockoutPolicy, now: DateTime<Utc>) -> bool {
        !self.locked || (policy.auto_unlock && self.window_elapsed(policy, now))
    }

    /// Record a failed credential check and return the resulting status.
    pub fn record_failure(&mut self, policy: &LockoutPolicy, now: DateTime<Utc>) -> LockStatus {
        if self.is_stale(policy, now) {
            tracing::debug!(
                previous_count = self.fail_count,
                "failure window elapsed; restarting failure count"
            );
            self.fail_count = 0;
            self.locked = false;
        }

        self.fail_count = self.fail_count.saturating_add(1);
        self.fail_time = Some(now);
        if self.fail_count >= policy.max_fails {
            self.locked = true;
        }
        self.status()
    }

    /// Record a successful credential check.
    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Explicit administrative unlock; clears the counters as well.
    pub fn unlock(&mut self) {
        *self = Self::default();
    }
}
