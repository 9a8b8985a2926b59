// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Centralized backoff policy.
//!
//! One policy serves every retry site: session reconnects after transient
//! drops, session setup retries after construction failures, and any
//! dispatcher-side retry. Call sites differ only in the parameters they
//! construct the policy with.

use std::time::Duration;

use rand::Rng;

/// Maps an attempt counter to a bounded, jittered delay.
///
/// The delay grows exponentially from `base` and is capped at `max`.
/// Multiplicative jitter of up to `jitter` (fraction, 0.0-1.0) is applied
/// in both directions so simultaneous retries across devices spread out.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// The delay before retry number `attempt` (0-based), with jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self.delay_without_jitter(attempt);
        if self.jitter == 0.0 {
            return capped;
        }
        let spread = capped.as_secs_f64() * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((capped.as_secs_f64() + offset).max(0.0))
    }

    /// The deterministic component of the delay, for tests and logging.
    pub fn delay_without_jitter(&self, attempt: u32) -> Duration {
        // Saturate the shift so large attempt counts cannot overflow.
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let scaled = self.base.saturating_mul(factor.min(u32::MAX as u64) as u32);
        scaled.min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300), 0.2)
    }
}
