// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Sendari gateway workspace.
//!
//! Enums that end up in SQLite TEXT columns derive both `strum::Display`
//! and `strum::EnumString` so the string forms round-trip losslessly.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable external identifier for one chat-session slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKey(pub String);

impl DeviceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceKey {
    fn from(s: &str) -> Self {
        DeviceKey(s.to_string())
    }
}

/// Outbound message class. Each class is dispatched independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    Personal,
    Group,
    Bulk,
}

impl MessageClass {
    /// All classes, in the order the dispatcher walks them.
    pub const ALL: [MessageClass; 3] =
        [MessageClass::Group, MessageClass::Personal, MessageClass::Bulk];
}

/// Delivery status of a queued message. Transitions are monotonic:
/// `pending -> processing -> {sent|failed}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

/// Persisted status of a device row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    Error,
    /// Lifetime expired or admin removal; the reaper releases the session.
    Removed,
    /// Terminal: cascade-delete erases the device and everything scoped to it.
    Deleted,
}

/// In-memory connection state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    QrPending,
    Connected,
    LoggedOut,
    Error,
}

/// Which message rows count against a device's daily quota.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QuotaPolicy {
    /// Every row that left `pending` today (sent, failed, or still processing).
    #[default]
    All,
    /// Only rows delivered today.
    Sent,
}

/// An inclusive millisecond range a randomized delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// A zero-width range; useful for tests that must not sleep.
    pub const ZERO: DelayRange = DelayRange::new(0, 0);
}

// --- Transport-facing types ---

/// A lifecycle event emitted by a per-device transport connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A pairing challenge payload that should be rendered for scanning.
    QrChallenge(String),
    /// Handshake completed; carries the resolved identity.
    Connected {
        jid: String,
        display_name: Option<String>,
    },
    /// Non-terminal drop; the session should reconnect with backoff.
    Disconnected { reason: String },
    /// Terminal revocation by the upstream network; never auto-reconnected.
    LoggedOut,
    /// A message arrived on this session.
    Inbound(InboundMessage),
}

/// An inbound message received on a connected session.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Chat identifier the message arrived in (direct peer or group).
    pub chat_id: String,
    /// Sender identifier, when the transport can resolve it.
    pub sender: Option<String>,
    pub text: String,
    pub is_group: bool,
}

/// Delivery report for a single recipient within one send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientReport {
    pub recipient: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate result of sending one queued message to its recipient set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub results: Vec<RecipientReport>,
}

impl SendReceipt {
    /// Success means every recipient in the set reported delivery.
    pub fn all_delivered(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.delivered)
    }
}

// --- Notification events ---

/// Events published to connected observers (UI clients) on connectivity changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
    QrUpdate { key: String, artifact: String },
    ConnectionStatus { key: String, connected: bool },
}

// --- Persisted entities ---

/// A registered device row.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: i64,
    pub owner_id: i64,
    pub device_key: String,
    pub label: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    /// Per-device daily message cap; 0 falls back to the system default.
    pub daily_limit: i64,
    /// Remaining lifetime in days; decremented once per day.
    pub life_time: i64,
    pub last_life_decrement: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A queued outbound message row.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub id: i64,
    pub owner_id: i64,
    pub device_id: i64,
    pub class: String,
    /// One identifier, or a comma-separated recipient set.
    pub recipient: String,
    pub body: String,
    pub status: String,
    pub response: Option<String>,
    pub tags: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Short alias mapping to an underlying group identifier.
#[derive(Debug, Clone)]
pub struct GroupAlias {
    pub id: i64,
    pub alias: String,
    pub underlying_id: String,
    pub name: Option<String>,
    pub device_key: String,
    pub registered_at: String,
}

/// A keyword autoreply rule scoped to one device.
#[derive(Debug, Clone)]
pub struct AutoreplyRule {
    pub id: i64,
    pub owner_id: i64,
    pub device_id: i64,
    pub keyword: String,
    pub response: String,
    pub status: String,
    pub used: i64,
}
