// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-device session state.
//!
//! A [`SessionEntry`] is the registry-internal record owned exclusively by
//! the [`SessionManager`](crate::SessionManager); everything outside the
//! manager reads sessions through cloned [`SessionSnapshot`]s.

use std::sync::Arc;
use std::time::Instant;

use sendari_core::types::ConnectionState;
use sendari_core::Transport;

/// Registry-internal state for one device key.
pub(crate) struct SessionEntry {
    pub state: ConnectionState,
    /// The live transport handle. Replaced wholesale on every reconnect;
    /// at most one exists per device key at any time.
    pub transport: Option<Arc<dyn Transport>>,
    /// Reference to the rendered QR artifact, when a scan is pending.
    pub qr_artifact: Option<String>,
    pub last_qr_at: Option<Instant>,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    /// Device row id/owner, cached after the connected transition.
    pub device_id: Option<i64>,
    pub owner_id: Option<i64>,
    /// Guards `create_session` against concurrent callers.
    pub creating: bool,
    /// Guards against scheduling a second reconnect for the same drop.
    pub reconnect_scheduled: bool,
    /// Bumped on every (re)connect. Event loops carry the epoch they were
    /// spawned under and stop once the entry has moved past it, so a stale
    /// loop can never clobber the state of a newer connection.
    pub epoch: u64,
}

impl SessionEntry {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transport: None,
            qr_artifact: None,
            last_qr_at: None,
            reconnect_attempts: 0,
            last_error: None,
            device_id: None,
            owner_id: None,
            creating: false,
            reconnect_scheduled: false,
            epoch: 0,
        }
    }

    pub fn snapshot(&self, key: &str) -> SessionSnapshot {
        SessionSnapshot {
            key: key.to_string(),
            state: self.state,
            connected: self.state == ConnectionState::Connected,
            qr_artifact: self.qr_artifact.clone(),
            reconnect_attempts: self.reconnect_attempts,
            last_error: self.last_error.clone(),
            device_id: self.device_id,
            owner_id: self.owner_id,
        }
    }
}

impl Default for SessionEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time, read-only view of one session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub key: String,
    pub state: ConnectionState,
    pub connected: bool,
    pub qr_artifact: Option<String>,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    pub device_id: Option<i64>,
    pub owner_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_starts_disconnected() {
        let entry = SessionEntry::new();
        assert_eq!(entry.state, ConnectionState::Disconnected);
        assert!(entry.transport.is_none());
        assert!(!entry.creating);
        assert_eq!(entry.epoch, 0);
    }

    #[test]
    fn snapshot_reflects_entry_state() {
        let mut entry = SessionEntry::new();
        entry.state = ConnectionState::Connected;
        entry.reconnect_attempts = 2;
        entry.device_id = Some(7);

        let snap = entry.snapshot("dev-1");
        assert_eq!(snap.key, "dev-1");
        assert!(snap.connected);
        assert_eq!(snap.reconnect_attempts, 2);
        assert_eq!(snap.device_id, Some(7));

        entry.state = ConnectionState::LoggedOut;
        let snap = entry.snapshot("dev-1");
        assert!(!snap.connected);
        assert_eq!(snap.state, ConnectionState::LoggedOut);
    }
}
