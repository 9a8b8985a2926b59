// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport trait for per-device chat-protocol connections.
//!
//! The wire protocol is not Sendari's concern: a transport is an opaque
//! handle that can deliver text to a recipient identifier and be closed.
//! Lifecycle events (QR challenges, connects, drops, inbound messages)
//! arrive on the event receiver returned from [`TransportFactory::connect`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SendariError;
use crate::types::{DeviceKey, RecipientReport, TransportEvent};

/// A live connection for one device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one message to a single recipient identifier.
    async fn send_text(
        &self,
        recipient: &str,
        body: &str,
    ) -> Result<RecipientReport, SendariError>;

    /// Closes the connection. Stored credential material is untouched, so the
    /// session can be reconnected later.
    async fn close(&self) -> Result<(), SendariError>;
}

/// A freshly established connection plus its event stream.
pub struct TransportConnection {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens transport connections for device keys.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Opens a connection for `key` using credential material under
    /// `credential_dir`. The connection starts its handshake immediately;
    /// progress is reported through the returned event receiver.
    async fn connect(
        &self,
        key: &DeviceKey,
        credential_dir: &Path,
    ) -> Result<TransportConnection, SendariError>;
}
