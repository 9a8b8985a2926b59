// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message queue operations.
//!
//! Every query that can move a message's status is scoped by device, class,
//! and day so concurrent dispatch ticks (or classes) cannot interfere with
//! each other's rows.

use rusqlite::params;
use sendari_core::types::{MessageClass, MessageStatus, QuotaPolicy};
use sendari_core::SendariError;

use crate::database::Database;
use crate::models::QueuedMessage;

const MESSAGE_COLUMNS: &str = "id, owner_id, device_id, class, recipient, body, status, \
     response, tags, created_at, updated_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueuedMessage> {
    Ok(QueuedMessage {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        device_id: row.get(2)?,
        class: row.get(3)?,
        recipient: row.get(4)?,
        body: row.get(5)?,
        status: row.get(6)?,
        response: row.get(7)?,
        tags: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Enqueue a new pending message. Returns the auto-generated message ID.
pub async fn enqueue(
    db: &Database,
    owner_id: i64,
    device_id: i64,
    class: MessageClass,
    recipient: &str,
    body: &str,
    tags: Option<&str>,
) -> Result<i64, SendariError> {
    let class = class.to_string();
    let recipient = recipient.to_string();
    let body = body.to_string();
    let tags = tags.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (owner_id, device_id, class, recipient, body, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![owner_id, device_id, class, recipient, body, tags],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a message by ID.
pub async fn get(db: &Database, id: i64) -> Result<Option<QueuedMessage>, SendariError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], row_to_message);
            match result {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Atomically claim a bounded batch of pending rows for one device, class,
/// and day, transitioning them to `processing`.
///
/// The selection and the update run in one transaction, and only rows
/// selected here are returned: rows left in `processing` by an earlier,
/// abandoned batch stay owned by that batch until the stale-requeue job
/// recovers them. Claims are returned in creation order.
pub async fn claim_batch(
    db: &Database,
    device_id: i64,
    class: MessageClass,
    day: &str,
    limit: i64,
) -> Result<Vec<QueuedMessage>, SendariError> {
    let class = class.to_string();
    let day = day.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let ids: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM messages
                     WHERE status = 'pending' AND device_id = ?1 AND class = ?2
                       AND date(created_at) = ?3
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?4",
                )?;
                let rows = stmt.query_map(params![device_id, class, day, limit], |row| {
                    row.get::<_, i64>(0)
                })?;
                let mut ids = Vec::new();
                for row in rows {
                    ids.push(row?);
                }
                ids
            };

            let mut claimed = Vec::with_capacity(ids.len());
            {
                let mut update = tx.prepare(
                    "UPDATE messages SET status = 'processing',
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1 AND status = 'pending'",
                )?;
                let mut select = tx.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
                ))?;
                for id in ids {
                    update.execute(params![id])?;
                    claimed.push(select.query_row(params![id], row_to_message)?);
                }
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count rows that consume today's quota for one device, per the policy.
pub async fn count_quota_used(
    db: &Database,
    device_id: i64,
    day: &str,
    policy: QuotaPolicy,
) -> Result<i64, SendariError> {
    let day = day.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = match policy {
                QuotaPolicy::All => conn.query_row(
                    "SELECT COUNT(*) FROM messages
                     WHERE device_id = ?1 AND date(created_at) = ?2
                       AND status != 'pending'",
                    params![device_id, day],
                    |row| row.get(0),
                )?,
                QuotaPolicy::Sent => conn.query_row(
                    "SELECT COUNT(*) FROM messages
                     WHERE device_id = ?1 AND date(created_at) = ?2
                       AND status = 'sent'",
                    params![device_id, day],
                    |row| row.get(0),
                )?,
            };
            Ok(count)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Persist a terminal status and the raw delivery receipt for one message.
pub async fn mark_terminal(
    db: &Database,
    id: i64,
    status: MessageStatus,
    response: Option<&str>,
) -> Result<(), SendariError> {
    debug_assert!(matches!(status, MessageStatus::Sent | MessageStatus::Failed));
    let status = status.to_string();
    let response = response.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET status = ?1, response = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![status, response, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count a device's rows in one status for one day.
pub async fn count_with_status(
    db: &Database,
    device_id: i64,
    status: MessageStatus,
    day: &str,
) -> Result<i64, SendariError> {
    let status = status.to_string();
    let day = day.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE device_id = ?1 AND status = ?2 AND date(created_at) = ?3",
                params![device_id, status, day],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Requeue rows stuck in `processing` since before `cutoff` (ISO timestamp).
///
/// This is the recovery path for batches abandoned by the failure breaker
/// or the quota boundary: their unattempted rows flip back to `pending` and
/// are claimed again by a later tick.
pub async fn requeue_stale_processing(
    db: &Database,
    cutoff: &str,
) -> Result<usize, SendariError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let affected = conn.execute(
                "UPDATE messages SET status = 'pending',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing' AND updated_at < ?1",
                params![cutoff],
            )?;
            Ok(affected)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete sent rows older than `sent_cutoff` and non-sent rows older than
/// `stale_cutoff`. Returns `(sent_deleted, stale_deleted)`.
pub async fn purge_older_than(
    db: &Database,
    sent_cutoff: &str,
    stale_cutoff: &str,
) -> Result<(usize, usize), SendariError> {
    let sent_cutoff = sent_cutoff.to_string();
    let stale_cutoff = stale_cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let sent = conn.execute(
                "DELETE FROM messages WHERE status = 'sent' AND created_at < ?1",
                params![sent_cutoff],
            )?;
            let stale = conn.execute(
                "DELETE FROM messages
                 WHERE status IN ('pending','failed','processing') AND created_at < ?1",
                params![stale_cutoff],
            )?;
            Ok((sent, stale))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether the device already has a message carrying `tag` today.
pub async fn has_tagged_today(
    db: &Database,
    device_id: i64,
    tag: &str,
    day: &str,
) -> Result<bool, SendariError> {
    let tag = tag.to_string();
    let day = day.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE device_id = ?1 AND tags = ?2 AND date(created_at) = ?3",
                params![device_id, tag, day],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
