// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast-based notifier for connected observers.
//!
//! A thin wrapper over `tokio::sync::broadcast`: UI-facing plumbing (not
//! part of this crate) subscribes and forwards events to its clients.
//! Publishing never blocks and drops events when nobody listens.

use std::sync::Arc;

use sendari_core::types::Notification;
use sendari_core::Notifier;
use tokio::sync::broadcast;
use tracing::debug;

pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { tx })
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: Notification) {
        // send only fails when there are no receivers; that's fine.
        if self.tx.send(event.clone()).is_err() {
            debug!(?event, "notification dropped (no subscribers)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let notifier = BroadcastNotifier::new(16);
        let mut rx = notifier.subscribe();

        notifier.publish(Notification::ConnectionStatus {
            key: "dev-1".into(),
            connected: true,
        });

        match rx.recv().await.unwrap() {
            Notification::ConnectionStatus { key, connected } => {
                assert_eq!(key, "dev-1");
                assert!(connected);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let notifier = BroadcastNotifier::new(16);
        notifier.publish(Notification::QrUpdate {
            key: "dev-1".into(),
            artifact: "/tmp/qr.svg".into(),
        });
    }
}
