// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for the Sendari gateway.
//!
//! The backoff policy and failure breaker here are the single source of
//! retry/abandonment behavior: session reconnects and dispatch batches both
//! consume them rather than carrying their own ad hoc timers and counters.

pub mod backoff;
pub mod breaker;
pub mod pacing;

pub use backoff::BackoffPolicy;
pub use breaker::FailureBreaker;
