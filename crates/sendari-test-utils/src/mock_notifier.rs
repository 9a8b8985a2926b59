// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notifier capturing published events for assertions.

use std::sync::{Arc, Mutex};

use sendari_core::types::Notification;
use sendari_core::Notifier;

/// Captures every published notification.
#[derive(Default)]
pub struct MockNotifier {
    events: Mutex<Vec<Notification>>,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    /// Connection-status events as `(key, connected)` pairs, in order.
    pub fn connection_statuses(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Notification::ConnectionStatus { key, connected } => Some((key, connected)),
                _ => None,
            })
            .collect()
    }

    /// QR-update events as `(key, artifact)` pairs, in order.
    pub fn qr_updates(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Notification::QrUpdate { key, artifact } => Some((key, artifact)),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for MockNotifier {
    fn publish(&self, event: Notification) {
        self.events.lock().unwrap().push(event);
    }
}
