// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-class and per-session queue processing.
//!
//! One class tick pages through connected devices, and for each device
//! claims a bounded batch of pending rows and walks them in creation order.
//! The walk enforces three independent brakes: the daily quota boundary,
//! the randomized pacing delays, and the consecutive-failure breaker.

use std::sync::Arc;

use sendari_config::model::DispatchConfig;
use sendari_core::types::{Device, DeviceKey, MessageClass, MessageStatus};
use sendari_core::SendariError;
use sendari_resilience::{pacing, FailureBreaker};
use sendari_session::SessionManager;
use sendari_storage::queries::{devices, groups, messages};
use sendari_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run one tick for one message class: page connected devices and process
/// each one's queue, with a randomized pause between sessions.
///
/// One session's failure never stops the others; per-session errors are
/// logged and the walk continues.
pub async fn run_class(
    db: &Database,
    manager: &Arc<SessionManager>,
    cfg: &DispatchConfig,
    class: MessageClass,
    cancel: &CancellationToken,
) {
    let page_size = cfg.session_page_size;
    let mut offset = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let page = match devices::list_connected_page(db, page_size, offset).await {
            Ok(page) => page,
            Err(e) => {
                warn!(class = %class, error = %e, "failed to page connected devices");
                return;
            }
        };
        if page.is_empty() {
            break;
        }

        for device in &page {
            if cancel.is_cancelled() {
                return;
            }
            // The store says connected; the manager has the live truth.
            if !manager.is_connected(&device.device_key) {
                debug!(key = device.device_key.as_str(), "session not live, skipping");
                continue;
            }

            if let Err(e) = process_session(db, manager, cfg, device, class).await {
                warn!(
                    key = device.device_key.as_str(),
                    class = %class,
                    error = %e,
                    "session queue processing failed"
                );
            }

            sleep_cancellable(cancel, &cfg.session_delay).await;
        }

        offset += page_size;
    }
}

/// Process one device's queue for one class within the current tick.
pub async fn process_session(
    db: &Database,
    manager: &Arc<SessionManager>,
    cfg: &DispatchConfig,
    device: &Device,
    class: MessageClass,
) -> Result<(), SendariError> {
    let today = sendari_storage::today();
    let daily_limit = if device.daily_limit > 0 {
        device.daily_limit
    } else {
        cfg.daily_limit_default
    };

    let used = messages::count_quota_used(db, device.id, &today, cfg.quota_policy).await?;
    if used >= daily_limit {
        info!(
            key = device.device_key.as_str(),
            limit = daily_limit,
            "daily limit reached, skipping session"
        );
        return Ok(());
    }

    let claimed =
        messages::claim_batch(db, device.id, class, &today, cfg.claim_batch_size).await?;
    if claimed.is_empty() {
        return Ok(());
    }
    debug!(
        key = device.device_key.as_str(),
        class = %class,
        claimed = claimed.len(),
        "claimed message batch"
    );

    let key = DeviceKey(device.device_key.clone());
    let mut breaker = FailureBreaker::new(cfg.failure_threshold);
    let mut attempted: i64 = 0;

    for (i, msg) in claimed.iter().enumerate() {
        if breaker.is_tripped() {
            // Remaining claims stay in processing; the stale-requeue job
            // hands them back to a later tick.
            warn!(
                key = device.device_key.as_str(),
                "too many consecutive failures, abandoning batch"
            );
            break;
        }
        if used + attempted >= daily_limit {
            info!(
                key = device.device_key.as_str(),
                limit = daily_limit,
                "daily limit boundary reached mid-batch"
            );
            break;
        }

        // Group targets may carry a short alias instead of a raw identifier.
        let recipient = if is_alias_target(class, &msg.recipient) {
            match groups::resolve(db, &msg.recipient).await? {
                Some(underlying) => underlying,
                None => {
                    messages::mark_terminal(
                        db,
                        msg.id,
                        MessageStatus::Failed,
                        Some(r#"{"error":"unknown group alias"}"#),
                    )
                    .await?;
                    breaker.record_failure();
                    warn!(
                        key = device.device_key.as_str(),
                        alias = msg.recipient.as_str(),
                        "unresolvable group alias"
                    );
                    continue;
                }
            }
        } else {
            msg.recipient.clone()
        };

        tokio::time::sleep(pacing::sample(&cfg.message_delay)).await;
        if i > 0 && i % cfg.micro_sleep_every == 0 {
            tokio::time::sleep(pacing::sample(&cfg.micro_sleep)).await;
        }

        attempted += 1;
        match manager.send_text(&key, &recipient, &msg.body).await {
            Ok(receipt) => {
                let delivered = receipt.all_delivered();
                let payload = serde_json::to_string(&receipt).ok();
                let status = if delivered {
                    MessageStatus::Sent
                } else {
                    MessageStatus::Failed
                };
                messages::mark_terminal(db, msg.id, status, payload.as_deref()).await?;
                if delivered {
                    breaker.record_success();
                    debug!(id = msg.id, key = device.device_key.as_str(), "message sent");
                } else {
                    breaker.record_failure();
                    warn!(id = msg.id, key = device.device_key.as_str(), "delivery failed");
                }
            }
            Err(e) => {
                // A single bad message never aborts the batch.
                let payload = serde_json::json!({ "error": e.to_string() }).to_string();
                messages::mark_terminal(db, msg.id, MessageStatus::Failed, Some(&payload))
                    .await?;
                breaker.record_failure();
                warn!(id = msg.id, key = device.device_key.as_str(), error = %e, "send error");
            }
        }
    }

    Ok(())
}

/// A group recipient with no raw-identifier marker is an alias.
fn is_alias_target(class: MessageClass, recipient: &str) -> bool {
    class == MessageClass::Group && !recipient.contains('@')
}

async fn sleep_cancellable(cancel: &CancellationToken, range: &sendari_core::types::DelayRange) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(pacing::sample(range)) => {}
    }
}
