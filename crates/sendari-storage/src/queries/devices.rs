// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device CRUD and lifecycle operations.

use rusqlite::params;
use sendari_core::types::DeviceStatus;
use sendari_core::SendariError;

use crate::database::Database;
use crate::models::Device;

const DEVICE_COLUMNS: &str = "id, owner_id, device_key, label, phone, status, daily_limit, \
     life_time, last_life_decrement, created_at, updated_at";

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        device_key: row.get(2)?,
        label: row.get(3)?,
        phone: row.get(4)?,
        status: row.get(5)?,
        daily_limit: row.get(6)?,
        life_time: row.get(7)?,
        last_life_decrement: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Register a new device row. Returns the auto-generated device ID.
pub async fn create_device(
    db: &Database,
    owner_id: i64,
    device_key: &str,
    label: Option<&str>,
    phone: Option<&str>,
) -> Result<i64, SendariError> {
    let device_key = device_key.to_string();
    let label = label.map(|s| s.to_string());
    let phone = phone.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO devices (owner_id, device_key, label, phone) VALUES (?1, ?2, ?3, ?4)",
                params![owner_id, device_key, label, phone],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a device by its stable external key.
pub async fn get_by_key(db: &Database, device_key: &str) -> Result<Option<Device>, SendariError> {
    let device_key = device_key.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices WHERE device_key = ?1"
            ))?;
            let result = stmt.query_row(params![device_key], row_to_device);
            match result {
                Ok(device) => Ok(Some(device)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update a device's status.
pub async fn update_status(
    db: &Database,
    device_key: &str,
    status: DeviceStatus,
) -> Result<(), SendariError> {
    update_status_with_identity(db, device_key, status, None, None).await
}

/// Update a device's status and, when present, its resolved identity fields.
///
/// Identity fields arrive with the `connected` transition: the transport
/// reports the account's phone number and display name after the handshake.
pub async fn update_status_with_identity(
    db: &Database,
    device_key: &str,
    status: DeviceStatus,
    phone: Option<&str>,
    label: Option<&str>,
) -> Result<(), SendariError> {
    let device_key = device_key.to_string();
    let status = status.to_string();
    let phone = phone.map(|s| s.to_string());
    let label = label.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE devices SET status = ?1,
                 phone = COALESCE(?2, phone),
                 label = COALESCE(?3, label),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE device_key = ?4",
                params![status, phone, label, device_key],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the per-device daily message cap (0 = use the system default).
pub async fn set_daily_limit(
    db: &Database,
    device_key: &str,
    daily_limit: i64,
) -> Result<(), SendariError> {
    let device_key = device_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE devices SET daily_limit = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE device_key = ?2",
                params![daily_limit, device_key],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set a device's remaining lifetime in days.
pub async fn set_life_time(
    db: &Database,
    device_key: &str,
    life_time: i64,
) -> Result<(), SendariError> {
    let device_key = device_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE devices SET life_time = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE device_key = ?2",
                params![life_time, device_key],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Page through connected devices in id order.
pub async fn list_connected_page(
    db: &Database,
    limit: i64,
    offset: i64,
) -> Result<Vec<Device>, SendariError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices
                 WHERE status = 'connected' ORDER BY id ASC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt.query_map(params![limit, offset], row_to_device)?;
            let mut devices = Vec::new();
            for row in rows {
                devices.push(row?);
            }
            Ok(devices)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List every device with the given status.
pub async fn list_by_status(
    db: &Database,
    status: DeviceStatus,
) -> Result<Vec<Device>, SendariError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices WHERE status = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![status], row_to_device)?;
            let mut devices = Vec::new();
            for row in rows {
                devices.push(row?);
            }
            Ok(devices)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Connected devices whose remaining lifetime is at most `max_days`.
pub async fn list_expiring(db: &Database, max_days: i64) -> Result<Vec<Device>, SendariError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices
                 WHERE status = 'connected' AND life_time <= ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![max_days], row_to_device)?;
            let mut devices = Vec::new();
            for row in rows {
                devices.push(row?);
            }
            Ok(devices)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Decrement remaining lifetime once for `today` across connected devices.
///
/// Devices reaching zero flip to `removed`. The `last_life_decrement` guard
/// makes the operation idempotent within one day, so a restarted process
/// cannot double-charge a device.
pub async fn decrement_life_time(db: &Database, today: &str) -> Result<usize, SendariError> {
    let today = today.to_string();
    db.connection()
        .call(move |conn| {
            let affected = conn.execute(
                "UPDATE devices
                 SET life_time = life_time - 1,
                     status = CASE WHEN life_time - 1 <= 0 THEN 'removed' ELSE status END,
                     last_life_decrement = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'connected' AND life_time > 0
                   AND (last_life_decrement IS NULL OR last_life_decrement < ?1)",
                params![today],
            )?;
            Ok(affected)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Erase a device and everything scoped to it in one transaction:
/// its messages, group aliases, autoreply rules, and the device row itself.
pub async fn delete_cascade(
    db: &Database,
    device_id: i64,
    device_key: &str,
) -> Result<(), SendariError> {
    let device_key = device_key.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE device_id = ?1", params![device_id])?;
            tx.execute(
                "DELETE FROM group_aliases WHERE device_key = ?1",
                params![device_key],
            )?;
            tx.execute("DELETE FROM autoreply WHERE device_id = ?1", params![device_id])?;
            tx.execute("DELETE FROM devices WHERE id = ?1", params![device_id])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn create_and_get_device_roundtrips() {
        let (db, _dir) = setup_db().await;

        let id = create_device(&db, 1, "dev-abc", Some("office"), None)
            .await
            .unwrap();
        assert!(id > 0);

        let device = get_by_key(&db, "dev-abc").await.unwrap().unwrap();
        assert_eq!(device.id, id);
        assert_eq!(device.owner_id, 1);
        assert_eq!(device.label.as_deref(), Some("office"));
        assert_eq!(device.status, "disconnected");
        assert_eq!(device.daily_limit, 0);

        assert!(get_by_key(&db, "no-such-key").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn connected_transition_persists_identity() {
        let (db, _dir) = setup_db().await;
        create_device(&db, 1, "dev-1", None, None).await.unwrap();

        update_status_with_identity(
            &db,
            "dev-1",
            DeviceStatus::Connected,
            Some("628111222333"),
            Some("Office Phone"),
        )
        .await
        .unwrap();

        let device = get_by_key(&db, "dev-1").await.unwrap().unwrap();
        assert_eq!(device.status, "connected");
        assert_eq!(device.phone.as_deref(), Some("628111222333"));
        assert_eq!(device.label.as_deref(), Some("Office Phone"));

        // A later status change without identity keeps the stored fields.
        update_status(&db, "dev-1", DeviceStatus::Disconnected)
            .await
            .unwrap();
        let device = get_by_key(&db, "dev-1").await.unwrap().unwrap();
        assert_eq!(device.status, "disconnected");
        assert_eq!(device.phone.as_deref(), Some("628111222333"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_connected_pages_in_id_order() {
        let (db, _dir) = setup_db().await;
        for i in 0..5 {
            let key = format!("dev-{i}");
            create_device(&db, 1, &key, None, None).await.unwrap();
            update_status(&db, &key, DeviceStatus::Connected)
                .await
                .unwrap();
        }
        create_device(&db, 1, "dev-offline", None, None).await.unwrap();

        let page1 = list_connected_page(&db, 2, 0).await.unwrap();
        let page2 = list_connected_page(&db, 2, 2).await.unwrap();
        let page3 = list_connected_page(&db, 2, 4).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_eq!(page3.len(), 1);
        assert_eq!(page1[0].device_key, "dev-0");
        assert_eq!(page3[0].device_key, "dev-4");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn decrement_life_time_is_idempotent_per_day() {
        let (db, _dir) = setup_db().await;
        create_device(&db, 1, "dev-1", None, None).await.unwrap();
        update_status(&db, "dev-1", DeviceStatus::Connected)
            .await
            .unwrap();
        set_life_time(&db, "dev-1", 2).await.unwrap();

        let affected = decrement_life_time(&db, "2026-03-01").await.unwrap();
        assert_eq!(affected, 1);
        let device = get_by_key(&db, "dev-1").await.unwrap().unwrap();
        assert_eq!(device.life_time, 1);
        assert_eq!(device.status, "connected");

        // Same day again: guard blocks a second decrement.
        let affected = decrement_life_time(&db, "2026-03-01").await.unwrap();
        assert_eq!(affected, 0);

        // Next day: decrements to zero and flips the device to removed.
        let affected = decrement_life_time(&db, "2026-03-02").await.unwrap();
        assert_eq!(affected, 1);
        let device = get_by_key(&db, "dev-1").await.unwrap().unwrap();
        assert_eq!(device.life_time, 0);
        assert_eq!(device.status, "removed");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_cascade_erases_all_scoped_rows() {
        let (db, _dir) = setup_db().await;
        let device_id = create_device(&db, 1, "dev-1", None, None).await.unwrap();

        crate::queries::messages::enqueue(
            &db,
            1,
            device_id,
            sendari_core::types::MessageClass::Personal,
            "628111",
            "hello",
            None,
        )
        .await
        .unwrap();
        crate::queries::groups::register(&db, "ABC123", "12345@g.us", None, "dev-1")
            .await
            .unwrap();
        crate::queries::autoreply::create(&db, 1, device_id, "ping", "pong")
            .await
            .unwrap();

        delete_cascade(&db, device_id, "dev-1").await.unwrap();

        assert!(get_by_key(&db, "dev-1").await.unwrap().is_none());
        let remaining: i64 = db
            .connection()
            .call(move |conn| -> Result<i64, tokio_rusqlite::Error> {
                let messages: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE device_id = ?1",
                    params![device_id],
                    |row| row.get(0),
                )?;
                let aliases: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM group_aliases WHERE device_key = 'dev-1'",
                    [],
                    |row| row.get(0),
                )?;
                let rules: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM autoreply WHERE device_id = ?1",
                    params![device_id],
                    |row| row.get(0),
                )?;
                Ok(messages + aliases + rules)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        db.close().await.unwrap();
    }
}
