// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic maintenance jobs sharing the store with the dispatcher.
//!
//! All jobs are best-effort: a failure in one pass is logged and does not
//! prevent future passes, and a failure on one device does not stop the
//! others in the same pass.

use std::sync::Arc;

use chrono::Utc;
use sendari_config::model::RetentionConfig;
use sendari_core::types::{DeviceKey, DeviceStatus, MessageClass};
use sendari_core::SendariError;
use sendari_session::SessionManager;
use sendari_storage::queries::{devices, messages};
use sendari_storage::Database;
use tracing::{info, warn};

/// Tag carried by expiry-warning messages, used for once-per-day dedup.
pub const LIFE_TIME_TAG: &str = "Life Time";

fn cutoff_days_ago(days: i64) -> String {
    (Utc::now() - chrono::Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Delete terminal-status messages past their retention windows.
pub async fn purge_old_messages(
    db: &Database,
    retention: &RetentionConfig,
) -> Result<(), SendariError> {
    let sent_cutoff = cutoff_days_ago(retention.sent_retention_days);
    let stale_cutoff = cutoff_days_ago(retention.stale_retention_days);
    let (sent, stale) = messages::purge_older_than(db, &sent_cutoff, &stale_cutoff).await?;
    info!(sent, stale, "old messages purged");
    Ok(())
}

/// Decrement per-device remaining lifetime once for today.
pub async fn decrement_device_life(db: &Database) -> Result<(), SendariError> {
    let today = sendari_storage::today();
    let affected = devices::decrement_life_time(db, &today).await?;
    info!(devices = affected, "device life-time decremented");
    Ok(())
}

/// Enqueue renewal warnings for devices whose lifetime is nearly over.
///
/// At most one warning per device per day, tagged [`LIFE_TIME_TAG`].
pub async fn send_deadline_warnings(db: &Database) -> Result<(), SendariError> {
    let today = sendari_storage::today();
    let expiring = devices::list_expiring(db, 3).await?;

    for device in expiring {
        let Some(phone) = device.phone.clone() else {
            continue;
        };
        match messages::has_tagged_today(db, device.id, LIFE_TIME_TAG, &today).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                warn!(key = device.device_key.as_str(), error = %e, "warning dedup check failed");
                continue;
            }
        }

        let body = warning_text(&device.device_key, device.life_time);
        match messages::enqueue(
            db,
            device.owner_id,
            device.id,
            MessageClass::Personal,
            &phone,
            &body,
            Some(LIFE_TIME_TAG),
        )
        .await
        {
            Ok(_) => info!(
                key = device.device_key.as_str(),
                days_left = device.life_time,
                "deadline warning enqueued"
            ),
            Err(e) => {
                warn!(key = device.device_key.as_str(), error = %e, "failed to enqueue warning")
            }
        }
    }
    Ok(())
}

fn warning_text(device_key: &str, days_left: i64) -> String {
    match days_left {
        d if d >= 3 => format!("Device {device_key} expires in 3 days."),
        2 => format!("Device {device_key} expires in 2 days."),
        1 => format!("Tomorrow is the last active day for device {device_key}."),
        _ => format!("Device {device_key} expires today."),
    }
}

/// One reaper pass: requeue stale `processing` rows, release sessions of
/// `removed` devices, and cascade-delete `deleted` devices.
pub async fn run_reaper_pass(
    db: &Database,
    manager: &Arc<SessionManager>,
    retention: &RetentionConfig,
) {
    match requeue_stale_processing(db, retention.processing_requeue_mins).await {
        Ok(0) => {}
        Ok(n) => info!(requeued = n, "stale processing rows requeued"),
        Err(e) => warn!(error = %e, "stale processing requeue failed"),
    }

    match reap_removed_devices(db, manager).await {
        Ok(0) => {}
        Ok(n) => info!(reaped = n, "removed-device sessions released"),
        Err(e) => warn!(error = %e, "removed-device reap failed"),
    }

    match cascade_delete_devices(db, manager).await {
        Ok(0) => {}
        Ok(n) => info!(deleted = n, "devices cascade-deleted"),
        Err(e) => warn!(error = %e, "device cascade delete failed"),
    }
}

/// Flip rows stuck in `processing` longer than `requeue_mins` back to
/// `pending` so abandoned batches recover on a later tick.
pub async fn requeue_stale_processing(
    db: &Database,
    requeue_mins: i64,
) -> Result<usize, SendariError> {
    let cutoff = (Utc::now() - chrono::Duration::minutes(requeue_mins))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    messages::requeue_stale_processing(db, &cutoff).await
}

/// Release the session and credentials of every `removed` device.
pub async fn reap_removed_devices(
    db: &Database,
    manager: &Arc<SessionManager>,
) -> Result<usize, SendariError> {
    let removed = devices::list_by_status(db, DeviceStatus::Removed).await?;
    let mut count = 0;
    for device in removed {
        let key = DeviceKey(device.device_key.clone());
        // No live session means a previous pass already released it.
        if manager.get_session(&key).is_none() {
            continue;
        }
        manager
            .remove_session_with_status(&key, true, DeviceStatus::Removed)
            .await;
        count += 1;
    }
    Ok(count)
}

/// Cascade-delete every device in the terminal `deleted` status: release
/// its session and credentials, then erase its rows in one transaction.
pub async fn cascade_delete_devices(
    db: &Database,
    manager: &Arc<SessionManager>,
) -> Result<usize, SendariError> {
    let deleted = devices::list_by_status(db, DeviceStatus::Deleted).await?;
    let mut count = 0;
    for device in deleted {
        let key = DeviceKey(device.device_key.clone());
        manager
            .remove_session_with_status(&key, true, DeviceStatus::Deleted)
            .await;
        match devices::delete_cascade(db, device.id, &device.device_key).await {
            Ok(()) => count += 1,
            Err(e) => {
                warn!(key = device.device_key.as_str(), error = %e, "cascade delete failed")
            }
        }
    }
    Ok(count)
}
