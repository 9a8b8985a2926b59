// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session lifecycle manager.
//!
//! Owns the in-memory registry of per-device sessions and guarantees exactly
//! one healthy, reconnecting-as-needed transport per device key. External
//! connection events drive an explicit state-transition function
//! ([`SessionManager::apply_event`]) invoked from a per-session event loop;
//! the rest of the system reads sessions only through snapshots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::StreamExt;
use sendari_config::model::SessionConfig;
use sendari_core::types::{
    AutoreplyRule, ConnectionState, DeviceKey, DeviceStatus, Notification, RecipientReport,
    SendReceipt, TransportEvent,
};
use sendari_core::{Notifier, SendariError, Transport, TransportFactory};
use sendari_resilience::BackoffPolicy;
use sendari_storage::queries::{autoreply, devices};
use sendari_storage::Database;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::inbound;
use crate::qr;
use crate::session::{SessionEntry, SessionSnapshot};

/// Owns every in-memory session and its transport handle.
///
/// All mutation goes through this type; other components only read through
/// [`get_session`](Self::get_session) / [`get_all_sessions`](Self::get_all_sessions)
/// and send through [`send_text`](Self::send_text).
pub struct SessionManager {
    db: Database,
    factory: Arc<dyn TransportFactory>,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
    sessions: DashMap<String, SessionEntry>,
    autoreply_cache: RwLock<Vec<AutoreplyRule>>,
    backoff: BackoffPolicy,
    shutting_down: AtomicBool,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(
        db: Database,
        factory: Arc<dyn TransportFactory>,
        notifier: Arc<dyn Notifier>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let backoff = BackoffPolicy::new(
            Duration::from_millis(config.reconnect_base_delay_ms),
            Duration::from_millis(config.reconnect_max_delay_ms),
            config.reconnect_jitter,
        );
        Arc::new(Self {
            db,
            factory,
            notifier,
            config,
            sessions: DashMap::new(),
            autoreply_cache: RwLock::new(Vec::new()),
            backoff,
            shutting_down: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Restore every persisted session from the credential directory.
    ///
    /// Folders without a `creds.json` are skipped and their device rows
    /// marked `error`. Restores run with bounded concurrency.
    pub async fn init_sessions(self: &Arc<Self>) -> Result<(), SendariError> {
        let dir = PathBuf::from(&self.config.session_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SendariError::Internal(format!("session dir: {e}")))?;

        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| SendariError::Internal(format!("session dir read: {e}")))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false)
            {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        info!(count = keys.len(), "restoring persisted sessions");

        futures::stream::iter(keys)
            .map(|key| {
                let mgr = Arc::clone(self);
                async move {
                    let creds = mgr.credential_dir(&key).join("creds.json");
                    if matches!(tokio::fs::try_exists(&creds).await, Ok(true)) {
                        mgr.create_session(&DeviceKey(key)).await;
                    } else {
                        warn!(
                            key = key.as_str(),
                            "missing or inaccessible creds.json, skipping session restore"
                        );
                        if let Err(e) =
                            devices::update_status(&mgr.db, &key, DeviceStatus::Error).await
                        {
                            warn!(key = key.as_str(), error = %e, "failed to mark device error");
                        }
                    }
                }
            })
            .buffer_unordered(self.config.init_concurrency.max(1))
            .collect::<Vec<()>>()
            .await;

        self.refresh_autoreply_cache().await;
        self.spawn_autoreply_refresher();

        info!("all sessions initialized");
        Ok(())
    }

    /// Create (or re-create) the session for `key` and start connecting.
    ///
    /// Idempotent against concurrent callers via the per-session `creating`
    /// flag. Transport setup failures are recorded in `last_error` and
    /// retried with backoff; they are never surfaced to the caller.
    pub async fn create_session(self: &Arc<Self>, key: &DeviceKey) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let (epoch, old_transport) = {
            let mut entry = self.sessions.entry(key.0.clone()).or_default();
            if entry.creating {
                debug!(key = %key, "create already in flight, skipping");
                return;
            }
            entry.creating = true;
            entry.state = ConnectionState::Connecting;
            entry.qr_artifact = None;
            entry.last_qr_at = None;
            entry.last_error = None;
            entry.epoch += 1;
            (entry.epoch, entry.transport.take())
        };

        // Release the previous handle before opening a new one; at most one
        // live transport may exist per device key.
        if let Some(old) = old_transport {
            if let Err(e) = old.close().await {
                debug!(key = %key, error = %e, "previous transport close failed");
            }
        }

        let cred_dir = self.credential_dir(key.as_str());
        if let Err(e) = tokio::fs::create_dir_all(&cred_dir).await {
            self.record_setup_failure(key, &format!("credential dir: {e}"))
                .await;
            return;
        }

        match self.factory.connect(key, &cred_dir).await {
            Ok(conn) => {
                let stale = match self.sessions.get_mut(key.as_str()) {
                    Some(mut entry) if entry.epoch == epoch => {
                        entry.transport = Some(Arc::clone(&conn.transport));
                        entry.creating = false;
                        false
                    }
                    // Superseded or removed while connecting.
                    _ => true,
                };
                if stale {
                    let _ = conn.transport.close().await;
                    return;
                }

                let mgr = Arc::clone(self);
                let loop_key = key.clone();
                tokio::spawn(async move {
                    mgr.event_loop(loop_key, conn.events, epoch).await;
                });
                info!(key = %key, "session connecting");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "session setup failed");
                self.record_setup_failure(key, &e.to_string()).await;
            }
        }
    }

    /// Remove the session, close its transport, and mark the device `removed`.
    pub async fn remove_session(&self, key: &DeviceKey, delete_credentials: bool) {
        self.remove_session_with_status(key, delete_credentials, DeviceStatus::Removed)
            .await;
    }

    /// Remove the session with an explicit device status (`disconnected`
    /// during graceful shutdown, `removed`/`deleted` from maintenance).
    pub async fn remove_session_with_status(
        &self,
        key: &DeviceKey,
        delete_credentials: bool,
        status: DeviceStatus,
    ) {
        if let Some((_, mut entry)) = self.sessions.remove(key.as_str()) {
            if let Some(transport) = entry.transport.take() {
                if let Err(e) = transport.close().await {
                    debug!(key = %key, error = %e, "transport close failed");
                }
            }
        }

        if delete_credentials {
            let dir = self.credential_dir(key.as_str());
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = %key, error = %e, "credential folder removal failed");
                }
            }
        }

        if let Err(e) = devices::update_status(&self.db, key.as_str(), status).await {
            warn!(key = %key, error = %e, "failed to update device status");
        }
        info!(key = %key, status = %status, "session removed");
    }

    /// Gracefully close every live session for shutdown.
    ///
    /// Distinct from removal: credentials are kept so sessions reconnect on
    /// the next start, and device rows are marked `disconnected`.
    pub async fn close_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.cancel.cancel();

        let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.remove_session_with_status(&DeviceKey(key), false, DeviceStatus::Disconnected)
                .await;
        }
        info!("all sessions closed");
    }

    /// Snapshot of one session, if it exists.
    pub fn get_session(&self, key: &DeviceKey) -> Option<SessionSnapshot> {
        self.sessions
            .get(key.as_str())
            .map(|entry| entry.snapshot(key.as_str()))
    }

    /// Snapshot of every session in the registry.
    pub fn get_all_sessions(&self) -> HashMap<String, SessionSnapshot> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.snapshot(entry.key())))
            .collect()
    }

    /// Whether the session for `key` is currently able to carry traffic.
    pub fn is_connected(&self, key: &str) -> bool {
        self.sessions
            .get(key)
            .map(|entry| entry.state == ConnectionState::Connected)
            .unwrap_or(false)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Send `body` to a recipient set through the session for `key`.
    ///
    /// The recipient set may be comma-separated; the overall receipt reports
    /// success only when every recipient reports delivery.
    pub async fn send_text(
        &self,
        key: &DeviceKey,
        recipient_set: &str,
        body: &str,
    ) -> Result<SendReceipt, SendariError> {
        let transport = {
            let entry = self.sessions.get(key.as_str()).ok_or_else(|| {
                SendariError::SessionUnavailable {
                    key: key.to_string(),
                    state: "absent".to_string(),
                }
            })?;
            if entry.state != ConnectionState::Connected {
                return Err(SendariError::SessionUnavailable {
                    key: key.to_string(),
                    state: entry.state.to_string(),
                });
            }
            entry
                .transport
                .clone()
                .ok_or_else(|| SendariError::SessionUnavailable {
                    key: key.to_string(),
                    state: "no transport".to_string(),
                })?
        };

        let mut results = Vec::new();
        for recipient in recipient_set
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            match transport.send_text(recipient, body).await {
                Ok(report) => results.push(report),
                Err(e) => results.push(RecipientReport {
                    recipient: recipient.to_string(),
                    delivered: false,
                    detail: Some(e.to_string()),
                }),
            }
        }
        Ok(SendReceipt { results })
    }

    /// Refresh the autoreply rule cache from the store.
    pub async fn refresh_autoreply_cache(&self) {
        match autoreply::list_active(&self.db).await {
            Ok(rules) => {
                debug!(count = rules.len(), "autoreply cache refreshed");
                *self.autoreply_cache.write().await = rules;
            }
            Err(e) => warn!(error = %e, "autoreply cache refresh failed"),
        }
    }

    // --- internals ---

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn transport_for(&self, key: &str) -> Option<Arc<dyn Transport>> {
        self.sessions.get(key).and_then(|entry| entry.transport.clone())
    }

    pub(crate) async fn autoreply_rules(&self) -> Vec<AutoreplyRule> {
        self.autoreply_cache.read().await.clone()
    }

    fn credential_dir(&self, key: &str) -> PathBuf {
        PathBuf::from(&self.config.session_dir).join(key)
    }

    fn spawn_autoreply_refresher(self: &Arc<Self>) {
        let mgr = Arc::clone(self);
        let period = Duration::from_secs(self.config.autoreply_refresh_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // first tick fires immediately; init already refreshed
            loop {
                tokio::select! {
                    _ = mgr.cancel.cancelled() => break,
                    _ = interval.tick() => mgr.refresh_autoreply_cache().await,
                }
            }
        });
    }

    async fn record_setup_failure(self: &Arc<Self>, key: &DeviceKey, reason: &str) {
        let still_present = match self.sessions.get_mut(key.as_str()) {
            Some(mut entry) => {
                entry.creating = false;
                entry.state = ConnectionState::Error;
                entry.last_error = Some(reason.to_string());
                true
            }
            None => false,
        };
        // Removed while connecting: no device update, no retry.
        if !still_present {
            return;
        }

        if let Err(e) = devices::update_status(&self.db, key.as_str(), DeviceStatus::Error).await {
            warn!(key = %key, error = %e, "failed to mark device error");
        }
        self.schedule_reconnect(key);
    }

    async fn event_loop(
        self: Arc<Self>,
        key: DeviceKey,
        mut events: mpsc::Receiver<TransportEvent>,
        epoch: u64,
    ) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                ev = events.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            if !self.apply_event(&key, epoch, event).await {
                break;
            }
        }
        debug!(key = %key, epoch, "event loop ended");
    }

    /// The state-transition function. Returns `false` when this event loop
    /// should stop (terminal event, or the loop's connection was superseded).
    pub(crate) async fn apply_event(
        self: &Arc<Self>,
        key: &DeviceKey,
        epoch: u64,
        event: TransportEvent,
    ) -> bool {
        {
            let Some(entry) = self.sessions.get(key.as_str()) else {
                return false;
            };
            if entry.epoch != epoch {
                return false;
            }
        }

        match event {
            TransportEvent::QrChallenge(payload) => {
                self.handle_qr(key, epoch, &payload).await;
                true
            }
            TransportEvent::Connected { jid, display_name } => {
                self.handle_connected(key, epoch, &jid, display_name.as_deref())
                    .await;
                true
            }
            TransportEvent::Disconnected { reason } => {
                self.handle_disconnected(key, &reason).await;
                false
            }
            TransportEvent::LoggedOut => {
                self.handle_logged_out(key).await;
                false
            }
            TransportEvent::Inbound(msg) => {
                inbound::handle(self, key, msg).await;
                true
            }
        }
    }

    async fn handle_qr(&self, key: &DeviceKey, epoch: u64, payload: &str) {
        let window = Duration::from_secs(self.config.qr_debounce_secs);
        {
            let Some(mut entry) = self.sessions.get_mut(key.as_str()) else {
                return;
            };
            if entry.epoch != epoch || !qr::debounce_elapsed(entry.last_qr_at, window) {
                return;
            }
            entry.last_qr_at = Some(Instant::now());
        }

        let dir = self.credential_dir(key.as_str());
        match qr::write_artifact(&dir, payload).await {
            Ok(path) => {
                let artifact = path.to_string_lossy().into_owned();
                {
                    let Some(mut entry) = self.sessions.get_mut(key.as_str()) else {
                        return;
                    };
                    if entry.epoch != epoch {
                        return;
                    }
                    entry.state = ConnectionState::QrPending;
                    entry.qr_artifact = Some(artifact.clone());
                    entry.last_error = None;
                }
                self.notifier.publish(Notification::QrUpdate {
                    key: key.to_string(),
                    artifact,
                });
            }
            Err(e) => warn!(key = %key, error = %e, "qr render failed"),
        }
    }

    async fn handle_connected(
        &self,
        key: &DeviceKey,
        epoch: u64,
        jid: &str,
        display_name: Option<&str>,
    ) {
        {
            let Some(mut entry) = self.sessions.get_mut(key.as_str()) else {
                return;
            };
            if entry.epoch != epoch {
                return;
            }
            entry.state = ConnectionState::Connected;
            entry.qr_artifact = None;
            entry.reconnect_attempts = 0;
            entry.last_error = None;
        }

        // Persist the resolved identity (best-effort).
        let phone = phone_from_jid(jid);
        if let Err(e) = devices::update_status_with_identity(
            &self.db,
            key.as_str(),
            DeviceStatus::Connected,
            phone.as_deref(),
            display_name,
        )
        .await
        {
            warn!(key = %key, error = %e, "failed to persist connected status");
        }

        // Cache the device row so inbound handling can scope autoreply rules.
        match devices::get_by_key(&self.db, key.as_str()).await {
            Ok(Some(device)) => {
                if let Some(mut entry) = self.sessions.get_mut(key.as_str()) {
                    if entry.epoch == epoch {
                        entry.device_id = Some(device.id);
                        entry.owner_id = Some(device.owner_id);
                    }
                }
            }
            Ok(None) => debug!(key = %key, "no device row for connected session"),
            Err(e) => warn!(key = %key, error = %e, "failed to resolve device row"),
        }

        self.notifier.publish(Notification::ConnectionStatus {
            key: key.to_string(),
            connected: true,
        });
        info!(key = %key, "session connected");
    }

    async fn handle_disconnected(self: &Arc<Self>, key: &DeviceKey, reason: &str) {
        let transport = {
            let Some(mut entry) = self.sessions.get_mut(key.as_str()) else {
                return;
            };
            if entry.state == ConnectionState::LoggedOut {
                return;
            }
            entry.state = ConnectionState::Disconnected;
            entry.transport.take()
        };
        if let Some(t) = transport {
            let _ = t.close().await;
        }

        self.notifier.publish(Notification::ConnectionStatus {
            key: key.to_string(),
            connected: false,
        });
        info!(key = %key, reason, "session disconnected");

        if !self.shutting_down.load(Ordering::SeqCst) {
            self.schedule_reconnect(key);
        }
    }

    async fn handle_logged_out(&self, key: &DeviceKey) {
        let transport = {
            let Some(mut entry) = self.sessions.get_mut(key.as_str()) else {
                return;
            };
            entry.state = ConnectionState::LoggedOut;
            entry.last_error = Some("logged out by the upstream network".to_string());
            entry.qr_artifact = None;
            entry.transport.take()
        };
        if let Some(t) = transport {
            let _ = t.close().await;
        }

        self.notifier.publish(Notification::ConnectionStatus {
            key: key.to_string(),
            connected: false,
        });

        // The session object stays queryable so callers see "logged out"
        // rather than a generic failure; only explicit removal drops it.
        if let Err(e) =
            devices::update_status(&self.db, key.as_str(), DeviceStatus::Disconnected).await
        {
            warn!(key = %key, error = %e, "failed to update device status after logout");
        }
        warn!(key = %key, "device logged out; automatic reconnect disabled");
    }

    /// Schedule a single backoff-delayed reconnect for `key`.
    ///
    /// While one reconnect is pending, further disconnect events for the
    /// same key are ignored here, preventing reconnect storms.
    fn schedule_reconnect(self: &Arc<Self>, key: &DeviceKey) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let attempt = {
            let Some(mut entry) = self.sessions.get_mut(key.as_str()) else {
                return;
            };
            if entry.reconnect_scheduled {
                return;
            }
            entry.reconnect_scheduled = true;
            entry.reconnect_attempts = entry.reconnect_attempts.saturating_add(1);
            entry.reconnect_attempts
        };

        let delay = self.backoff.delay(attempt - 1);
        info!(
            key = %key,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );

        let mgr = Arc::clone(self);
        let key = key.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = mgr.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let Some(mut entry) = mgr.sessions.get_mut(key.as_str()) else {
                    return;
                };
                entry.reconnect_scheduled = false;
                if entry.state == ConnectionState::LoggedOut {
                    return;
                }
            }
            mgr.create_session(&key).await;
        });
    }
}

/// Extract the bare phone number from a transport identity (`phone[:suffix]@host`).
fn phone_from_jid(jid: &str) -> Option<String> {
    let user = jid.split('@').next()?;
    let phone = user.split(':').next()?;
    if phone.is_empty() {
        None
    } else {
        Some(phone.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_extraction_strips_host_and_suffix() {
        assert_eq!(
            phone_from_jid("628111222333:5@s.whatsapp.net").as_deref(),
            Some("628111222333")
        );
        assert_eq!(
            phone_from_jid("628111222333@s.whatsapp.net").as_deref(),
            Some("628111222333")
        );
        assert_eq!(phone_from_jid("@host"), None);
    }
}
