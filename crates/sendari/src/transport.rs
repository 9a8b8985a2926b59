// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback transport for local development and smoke runs.
//!
//! Real chat-network adapters live in their own crates; the daemon falls
//! back to this transport so the full pipeline (sessions, dispatch, pacing,
//! persistence) can be exercised without network credentials. Connections
//! succeed immediately and every send reports delivery.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sendari_core::types::{DeviceKey, RecipientReport, TransportEvent};
use sendari_core::{SendariError, Transport, TransportConnection, TransportFactory};
use tokio::sync::mpsc;
use tracing::info;

pub struct LoopbackTransport {
    key: String,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send_text(
        &self,
        recipient: &str,
        body: &str,
    ) -> Result<RecipientReport, SendariError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SendariError::transport("transport closed"));
        }
        info!(
            key = self.key.as_str(),
            recipient,
            bytes = body.len(),
            "loopback delivery"
        );
        Ok(RecipientReport {
            recipient: recipient.to_string(),
            delivered: true,
            detail: Some(format!("loopback-{}", uuid::Uuid::new_v4())),
        })
    }

    async fn close(&self) -> Result<(), SendariError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct LoopbackTransportFactory;

impl LoopbackTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl TransportFactory for LoopbackTransportFactory {
    async fn connect(
        &self,
        key: &DeviceKey,
        _credential_dir: &Path,
    ) -> Result<TransportConnection, SendariError> {
        let (events_tx, events) = mpsc::channel(16);
        let transport = Arc::new(LoopbackTransport {
            key: key.to_string(),
            closed: AtomicBool::new(false),
        });

        // The handshake completes instantly; no QR challenge is needed.
        let _ = events_tx
            .send(TransportEvent::Connected {
                jid: format!("{key}@loopback"),
                display_name: Some("Loopback".to_string()),
            })
            .await;
        // Keep the sender alive with the connection so the event stream
        // stays open for the session's lifetime.
        tokio::spawn(async move {
            events_tx.closed().await;
        });

        Ok(TransportConnection { transport, events })
    }
}
