// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Autoreply rule operations.

use rusqlite::params;
use sendari_core::SendariError;

use crate::database::Database;
use crate::models::AutoreplyRule;

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<AutoreplyRule> {
    Ok(AutoreplyRule {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        device_id: row.get(2)?,
        keyword: row.get(3)?,
        response: row.get(4)?,
        status: row.get(5)?,
        used: row.get(6)?,
    })
}

/// Create an active autoreply rule. Returns the auto-generated rule ID.
pub async fn create(
    db: &Database,
    owner_id: i64,
    device_id: i64,
    keyword: &str,
    response: &str,
) -> Result<i64, SendariError> {
    let keyword = keyword.to_string();
    let response = response.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO autoreply (owner_id, device_id, keyword, response)
                 VALUES (?1, ?2, ?3, ?4)",
                params![owner_id, device_id, keyword, response],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List every active rule, for the read-through cache.
pub async fn list_active(db: &Database) -> Result<Vec<AutoreplyRule>, SendariError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, device_id, keyword, response, status, used
                 FROM autoreply WHERE status = 'active' ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], row_to_rule)?;
            let mut rules = Vec::new();
            for row in rows {
                rules.push(row?);
            }
            Ok(rules)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Bump a rule's usage counter after a reply was sent.
pub async fn record_use(db: &Database, id: i64) -> Result<(), SendariError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE autoreply SET used = used + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
