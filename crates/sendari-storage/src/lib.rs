// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Sendari gateway.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed query operations for
//! devices, the outbound message queue, group aliases, and autoreply rules.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;

/// Today's day-scope string (`YYYY-MM-DD`, UTC), matching how row
/// timestamps are stored.
pub fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// The current row timestamp (ISO-8601 with milliseconds, UTC), matching
/// the SQL `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` defaults.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
