// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Randomized pacing delays.
//!
//! All humanized delays in the gateway (inter-message, inter-session,
//! micro-sleep, autoreply) are drawn from configured [`DelayRange`]s
//! through this one sampler.

use std::time::Duration;

use rand::Rng;
use sendari_core::types::DelayRange;

/// Draw a uniformly random delay from the inclusive range.
pub fn sample(range: &DelayRange) -> Duration {
    if range.max_ms <= range.min_ms {
        return Duration::from_millis(range.min_ms);
    }
    let ms = rand::thread_rng().gen_range(range.min_ms..=range.max_ms);
    Duration::from_millis(ms)
}
