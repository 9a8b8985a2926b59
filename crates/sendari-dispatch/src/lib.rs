// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limited dispatch scheduling for the Sendari gateway.
//!
//! The [`DispatchScheduler`] periodically converts queued `pending` messages
//! into delivery attempts through the currently connected sessions, without
//! exceeding per-device daily volume and without producing a traffic pattern
//! distinguishable from a human user. Maintenance jobs (retention, device
//! lifetime, reaping, stale-claim recovery) share its timers.

pub mod maintenance;
pub mod pipeline;
pub mod scheduler;

pub use scheduler::{ClassState, DispatchScheduler};
