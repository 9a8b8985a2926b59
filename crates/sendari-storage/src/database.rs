// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use sendari_core::SendariError;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Handle to the SQLite store.
///
/// Cloneable; all clones share the single writer thread.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path` with WAL mode enabled and
    /// run pending migrations.
    pub async fn open(path: &str) -> Result<Self, SendariError> {
        Self::open_with(path, true).await
    }

    /// Open with an explicit WAL-mode choice (from `storage.wal_mode`).
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, SendariError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SendariError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = Connection::open(path).await.map_err(|e| map_tr_err(e.into()))?;
        conn.call(move |conn| -> Result<(), SendariError> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")
                    .map_err(|e| map_tr_err(e.into()))?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(|e| map_tr_err(e.into()))?;
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(|e| map_tr_err(e.into()))?;
            conn.busy_timeout(Duration::from_secs(5))
                .map_err(|e| map_tr_err(e.into()))?;
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(inner) => inner,
            other => SendariError::Storage {
                source: Box::new(other),
            },
        })?;

        debug!(path = path, wal = wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the store, flushing pending writes.
    pub async fn close(&self) -> Result<(), SendariError> {
        self.conn.clone().close().await.map_err(map_tr_err)
    }
}

/// Map a tokio-rusqlite error into the workspace error type.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> SendariError {
    SendariError::Storage {
        source: Box::new(e),
    }
}
