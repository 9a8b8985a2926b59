// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures: temp databases, sleep-free configs, and seed helpers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sendari_config::model::{DispatchConfig, SendariConfig, SessionConfig};
use sendari_core::types::{DelayRange, Device, DeviceKey, DeviceStatus};
use sendari_core::{Notifier, TransportFactory};
use sendari_session::SessionManager;
use sendari_storage::queries::devices;
use sendari_storage::Database;
use tempfile::TempDir;

/// Open a fresh migrated database in a temp directory.
pub async fn temp_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("test.db");
    let db = Database::open(db_path.to_str().unwrap())
        .await
        .expect("open test db");
    (db, dir)
}

/// A configuration with every humanized delay zeroed so tests never sleep.
pub fn test_config(dir: &Path) -> SendariConfig {
    let mut config = SendariConfig::default();
    config.storage.database_path = dir.join("test.db").to_string_lossy().into_owned();
    config.session = test_session_config(dir);
    config.dispatch = test_dispatch_config();
    config
}

/// Session settings pointing at a temp credential dir, without debounce.
pub fn test_session_config(dir: &Path) -> SessionConfig {
    let mut session = SessionConfig::default();
    session.session_dir = dir.join("sessions").to_string_lossy().into_owned();
    session.qr_debounce_secs = 0;
    session.reconnect_base_delay_ms = 10;
    session.reconnect_max_delay_ms = 50;
    session.reconnect_jitter = 0.0;
    session.autoreply_delay = DelayRange::ZERO;
    session
}

/// Dispatch settings with a permanently open window and zero pacing.
pub fn test_dispatch_config() -> DispatchConfig {
    let mut dispatch = DispatchConfig::default();
    dispatch.tick_interval_secs = 1;
    dispatch.active_hours_start = 0;
    dispatch.active_hours_end = 24;
    dispatch.message_delay = DelayRange::ZERO;
    dispatch.session_delay = DelayRange::ZERO;
    dispatch.micro_sleep = DelayRange::ZERO;
    dispatch.shutdown_grace_secs = 2;
    dispatch
}

/// Build a session manager over a temp store with the given mocks.
pub fn test_manager(
    db: Database,
    factory: Arc<dyn TransportFactory>,
    notifier: Arc<dyn Notifier>,
    dir: &Path,
) -> Arc<SessionManager> {
    SessionManager::new(db, factory, notifier, test_session_config(dir))
}

/// Seed a device row in `connected` store status and return it.
pub async fn seed_device(db: &Database, key: &str, daily_limit: i64) -> Device {
    devices::create_device(db, 1, key, None, Some("628000000000"))
        .await
        .expect("create device");
    devices::update_status(db, key, DeviceStatus::Connected)
        .await
        .expect("mark connected");
    if daily_limit > 0 {
        devices::set_daily_limit(db, key, daily_limit)
            .await
            .expect("set daily limit");
    }
    devices::get_by_key(db, key)
        .await
        .expect("get device")
        .expect("device row")
}

/// Create a session for `key` and wait until the manager reports it
/// connected. Panics after `timeout`.
pub async fn connect_session(manager: &Arc<SessionManager>, key: &str, timeout: Duration) {
    manager.create_session(&DeviceKey(key.to_string())).await;
    let connected = wait_for(timeout, || manager.is_connected(key)).await;
    assert!(connected, "session {key} did not reach connected in time");
}

/// Poll `predicate` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
