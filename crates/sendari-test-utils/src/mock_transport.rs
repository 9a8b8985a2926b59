// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic testing.
//!
//! `MockTransportFactory` implements `TransportFactory` with scripted
//! connect behavior. Each connect yields a `MockTransport` that captures
//! sends and a handle through which tests inject lifecycle events.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sendari_core::types::{DeviceKey, RecipientReport, TransportEvent};
use sendari_core::{SendariError, Transport, TransportConnection, TransportFactory};
use tokio::sync::mpsc;

/// A mock per-device connection.
///
/// Captures every `send_text` call; recipients registered via
/// [`fail_recipient`](Self::fail_recipient) report non-delivery, and those
/// registered via [`error_recipient`](Self::error_recipient) make the send
/// call itself fail.
pub struct MockTransport {
    key: String,
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    erroring: Mutex<HashSet<String>>,
    closed: AtomicBool,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl MockTransport {
    /// Inject a lifecycle event as if the upstream network emitted it.
    pub async fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event).await;
    }

    /// All `(recipient, body)` pairs sent through this transport.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Make `recipient` report non-delivery (send succeeds, receipt says no).
    pub fn fail_recipient(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    /// Make sends to `recipient` return an error outright.
    pub fn error_recipient(&self, recipient: &str) {
        self.erroring.lock().unwrap().insert(recipient.to_string());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(
        &self,
        recipient: &str,
        body: &str,
    ) -> Result<RecipientReport, SendariError> {
        if self.is_closed() {
            return Err(SendariError::transport("transport closed"));
        }
        if self.erroring.lock().unwrap().contains(recipient) {
            return Err(SendariError::transport(format!(
                "simulated send error to {recipient}"
            )));
        }

        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), body.to_string()));

        let delivered = !self.failing.lock().unwrap().contains(recipient);
        Ok(RecipientReport {
            recipient: recipient.to_string(),
            delivered,
            detail: if delivered {
                Some(format!("mock-{}", uuid::Uuid::new_v4()))
            } else {
                Some("rejected".to_string())
            },
        })
    }

    async fn close(&self) -> Result<(), SendariError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted factory handing out [`MockTransport`]s.
pub struct MockTransportFactory {
    /// Keys whose next connect attempts fail.
    failing_keys: Mutex<HashSet<String>>,
    /// Emit a `Connected` event immediately after connect (default true).
    auto_connect: AtomicBool,
    /// Artificial connect latency, for racing concurrent create calls.
    connect_delay: Mutex<Duration>,
    connects: Mutex<Vec<String>>,
    handles: Mutex<HashMap<String, Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing_keys: Mutex::new(HashSet::new()),
            auto_connect: AtomicBool::new(true),
            connect_delay: Mutex::new(Duration::ZERO),
            connects: Mutex::new(Vec::new()),
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Disable the automatic `Connected` event; tests drive the handshake
    /// through [`MockTransport::emit`] instead.
    pub fn manual_handshake(self: &Arc<Self>) -> Arc<Self> {
        self.auto_connect.store(false, Ordering::SeqCst);
        Arc::clone(self)
    }

    /// Make connect attempts for `key` fail until cleared.
    pub fn fail_connects(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn clear_connect_failure(&self, key: &str) {
        self.failing_keys.lock().unwrap().remove(key);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    /// Number of successful connect calls for `key`.
    pub fn connect_count(&self, key: &str) -> usize {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }

    /// The most recent transport handed out for `key`.
    pub fn handle(&self, key: &str) -> Option<Arc<MockTransport>> {
        self.handles.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn connect(
        &self,
        key: &DeviceKey,
        _credential_dir: &Path,
    ) -> Result<TransportConnection, SendariError> {
        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing_keys.lock().unwrap().contains(key.as_str()) {
            return Err(SendariError::transport(format!(
                "simulated connect failure for {key}"
            )));
        }

        let (events_tx, events) = mpsc::channel(64);
        let transport = Arc::new(MockTransport {
            key: key.to_string(),
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            erroring: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
            events_tx,
        });

        self.connects.lock().unwrap().push(key.to_string());
        self.handles
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::clone(&transport));

        if self.auto_connect.load(Ordering::SeqCst) {
            transport
                .emit(TransportEvent::Connected {
                    jid: format!("{}@mock.net", transport.key),
                    display_name: Some("Mock Device".to_string()),
                })
                .await;
        }

        Ok(TransportConnection {
            transport,
            events,
        })
    }
}
