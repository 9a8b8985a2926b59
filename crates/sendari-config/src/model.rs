// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Sendari gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

use sendari_core::types::{DelayRange, QuotaPolicy};

/// Top-level Sendari configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendariConfig {
    /// Gateway identity and logging settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Dispatch scheduler settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Retention and maintenance settings.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Gateway identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Display name of the gateway instance.
    #[serde(default = "default_gateway_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_gateway_name() -> String {
    "sendari".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("sendari").join("sendari.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("sendari.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Directory holding per-device credential folders.
    #[serde(default = "default_session_dir")]
    pub session_dir: String,

    /// Concurrency limit for bulk session restore at startup.
    #[serde(default = "default_init_concurrency")]
    pub init_concurrency: usize,

    /// Minimum seconds between QR artifact re-renders for one session.
    #[serde(default = "default_qr_debounce_secs")]
    pub qr_debounce_secs: u64,

    /// Base reconnect delay in milliseconds (grows with each attempt).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Multiplicative jitter fraction applied to reconnect delays (0.0-1.0).
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter: f64,

    /// Seconds between autoreply cache refreshes.
    #[serde(default = "default_autoreply_refresh_secs")]
    pub autoreply_refresh_secs: u64,

    /// Humanized delay range before an autoreply is sent.
    #[serde(default = "default_autoreply_delay")]
    pub autoreply_delay: DelayRange,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
            init_concurrency: default_init_concurrency(),
            qr_debounce_secs: default_qr_debounce_secs(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_jitter: default_reconnect_jitter(),
            autoreply_refresh_secs: default_autoreply_refresh_secs(),
            autoreply_delay: default_autoreply_delay(),
        }
    }
}

fn default_session_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("sendari").join("sessions"))
        .unwrap_or_else(|| std::path::PathBuf::from(".sessions"))
        .to_string_lossy()
        .into_owned()
}

fn default_init_concurrency() -> usize {
    5
}

fn default_qr_debounce_secs() -> u64 {
    30
}

fn default_reconnect_base_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    300_000
}

fn default_reconnect_jitter() -> f64 {
    0.2
}

fn default_autoreply_refresh_secs() -> u64 {
    300
}

fn default_autoreply_delay() -> DelayRange {
    DelayRange::new(2_000, 5_000)
}

/// Dispatch scheduler configuration.
///
/// The delay ranges are deliberate pacing controls: dispatch traffic must
/// stay indistinguishable from a human user of the upstream network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Seconds between dispatch ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// First local hour (inclusive) of the operational window.
    #[serde(default = "default_active_hours_start")]
    pub active_hours_start: u32,

    /// Last local hour (exclusive) of the operational window.
    #[serde(default = "default_active_hours_end")]
    pub active_hours_end: u32,

    /// Daily message cap applied when a device's own limit is unset.
    #[serde(default = "default_daily_limit")]
    pub daily_limit_default: i64,

    /// Page size used when iterating connected devices.
    #[serde(default = "default_session_page_size")]
    pub session_page_size: i64,

    /// Maximum pending rows claimed per device per tick.
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: i64,

    /// Consecutive send failures that abandon the rest of a batch.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Randomized delay between messages within one session.
    #[serde(default = "default_message_delay")]
    pub message_delay: DelayRange,

    /// Randomized delay between sessions within one tick.
    #[serde(default = "default_session_delay")]
    pub session_delay: DelayRange,

    /// Number of messages between micro-sleeps.
    #[serde(default = "default_micro_sleep_every")]
    pub micro_sleep_every: usize,

    /// Randomized micro-sleep applied every `micro_sleep_every` messages.
    #[serde(default = "default_micro_sleep")]
    pub micro_sleep: DelayRange,

    /// Which message rows count against the daily quota.
    #[serde(default)]
    pub quota_policy: QuotaPolicy,

    /// Seconds to wait for in-flight ticks during shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            active_hours_start: default_active_hours_start(),
            active_hours_end: default_active_hours_end(),
            daily_limit_default: default_daily_limit(),
            session_page_size: default_session_page_size(),
            claim_batch_size: default_claim_batch_size(),
            failure_threshold: default_failure_threshold(),
            message_delay: default_message_delay(),
            session_delay: default_session_delay(),
            micro_sleep_every: default_micro_sleep_every(),
            micro_sleep: default_micro_sleep(),
            quota_policy: QuotaPolicy::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    20
}

fn default_active_hours_start() -> u32 {
    6
}

fn default_active_hours_end() -> u32 {
    24
}

fn default_daily_limit() -> i64 {
    250
}

fn default_session_page_size() -> i64 {
    10
}

fn default_claim_batch_size() -> i64 {
    15
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_message_delay() -> DelayRange {
    DelayRange::new(5_000, 15_000)
}

fn default_session_delay() -> DelayRange {
    DelayRange::new(10_000, 30_000)
}

fn default_micro_sleep_every() -> usize {
    10
}

fn default_micro_sleep() -> DelayRange {
    DelayRange::new(30_000, 90_000)
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Retention and maintenance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days a `sent` message is kept before the retention purge deletes it.
    #[serde(default = "default_sent_retention_days")]
    pub sent_retention_days: i64,

    /// Days a non-sent message is kept before the retention purge deletes it.
    #[serde(default = "default_stale_retention_days")]
    pub stale_retention_days: i64,

    /// Minutes a row may sit in `processing` before it is requeued.
    #[serde(default = "default_processing_requeue_mins")]
    pub processing_requeue_mins: i64,

    /// Cron schedule for the retention purge.
    #[serde(default = "default_purge_schedule")]
    pub purge_schedule: String,

    /// Cron schedule for the daily device life-time decrement.
    #[serde(default = "default_life_schedule")]
    pub life_schedule: String,

    /// Cron schedule for expiry deadline warnings.
    #[serde(default = "default_warning_schedule")]
    pub warning_schedule: String,

    /// Seconds between removed-device reaper runs.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sent_retention_days: default_sent_retention_days(),
            stale_retention_days: default_stale_retention_days(),
            processing_requeue_mins: default_processing_requeue_mins(),
            purge_schedule: default_purge_schedule(),
            life_schedule: default_life_schedule(),
            warning_schedule: default_warning_schedule(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

fn default_sent_retention_days() -> i64 {
    30
}

fn default_stale_retention_days() -> i64 {
    60
}

fn default_processing_requeue_mins() -> i64 {
    30
}

fn default_purge_schedule() -> String {
    "0 2 * * *".to_string()
}

fn default_life_schedule() -> String {
    "0 0 * * *".to_string()
}

fn default_warning_schedule() -> String {
    "0 9 * * *".to_string()
}

fn default_reaper_interval_secs() -> u64 {
    300
}
