// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consecutive-failure breaker.
//!
//! The dispatch pipeline uses one breaker per session batch: a session whose
//! sends fail repeatedly has usually gone bad underneath (half-open network,
//! silent revocation), and hammering the rest of the batch through it only
//! makes the traffic pattern worse.

/// Counts consecutive failures and trips at a fixed threshold.
#[derive(Debug, Clone)]
pub struct FailureBreaker {
    threshold: u32,
    consecutive: u32,
}

impl FailureBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Records a success, resetting the consecutive counter.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Records a failure. Returns `true` if the breaker is now tripped.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.is_tripped()
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive >= self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }
}
