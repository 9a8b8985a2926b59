// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group alias mapping operations.
//!
//! Aliases are short identifiers handed out by the inbound `/register`
//! command; the dispatcher resolves them back to the underlying group
//! identifier when a queued message targets an alias.

use rusqlite::params;
use sendari_core::SendariError;

use crate::database::Database;
use crate::models::GroupAlias;

fn row_to_alias(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupAlias> {
    Ok(GroupAlias {
        id: row.get(0)?,
        alias: row.get(1)?,
        underlying_id: row.get(2)?,
        name: row.get(3)?,
        device_key: row.get(4)?,
        registered_at: row.get(5)?,
    })
}

/// Register a new alias for an underlying group identifier.
pub async fn register(
    db: &Database,
    alias: &str,
    underlying_id: &str,
    name: Option<&str>,
    device_key: &str,
) -> Result<(), SendariError> {
    let alias = alias.to_string();
    let underlying_id = underlying_id.to_string();
    let name = name.map(|s| s.to_string());
    let device_key = device_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO group_aliases (alias, underlying_id, name, device_key)
                 VALUES (?1, ?2, ?3, ?4)",
                params![alias, underlying_id, name, device_key],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Resolve an alias to its underlying group identifier.
pub async fn resolve(db: &Database, alias: &str) -> Result<Option<String>, SendariError> {
    let alias = alias.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT underlying_id FROM group_aliases WHERE alias = ?1",
                params![alias],
                |row| row.get::<_, String>(0),
            );
            match result {
                Ok(id) => Ok(Some(id)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find the mapping for an underlying group on one device, if registered.
pub async fn find_by_underlying(
    db: &Database,
    underlying_id: &str,
    device_key: &str,
) -> Result<Option<GroupAlias>, SendariError> {
    let underlying_id = underlying_id.to_string();
    let device_key = device_key.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, alias, underlying_id, name, device_key, registered_at
                 FROM group_aliases WHERE underlying_id = ?1 AND device_key = ?2",
            )?;
            let result = stmt.query_row(params![underlying_id, device_key], row_to_alias);
            match result {
                Ok(mapping) => Ok(Some(mapping)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove the mapping for an underlying group on one device.
///
/// Returns `true` if a mapping existed.
pub async fn unregister(
    db: &Database,
    underlying_id: &str,
    device_key: &str,
) -> Result<bool, SendariError> {
    let underlying_id = underlying_id.to_string();
    let device_key = device_key.to_string();
    db.connection()
        .call(move |conn| {
            let affected = conn.execute(
                "DELETE FROM group_aliases WHERE underlying_id = ?1 AND device_key = ?2",
                params![underlying_id, device_key],
            )?;
            Ok(affected > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
