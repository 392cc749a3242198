//! Purpose: Persist `(input, output)` decodings in an append-only SQLite log.
//! Exports: `HistoryStore`, `HistoryEntry`, `DEFAULT_HISTORY_LIMIT`.
//! Role: Persistence collaborator for the HTTP server and `history` command.
//! Invariants: Rows are only ever inserted; ids increase with insertion order.
//! Invariants: Listings are newest-first and bounded by the caller's limit.
//! Invariants: Every SQLite failure surfaces as `ErrorKind::Storage`.

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

const HISTORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversion_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    input_string TEXT NOT NULL,
    output_result TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub input: String,
    pub output: Vec<u64>,
    pub timestamp: String,
}

/// SQLite-backed history log, shareable across threads.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(|err| {
            storage_error("failed to open history database", err)
                .with_hint(format!("Check that {} is writable.", path.display()))
        })?;
        Self::from_connection(conn)
    }

    /// In-memory store, mostly for tests.
    pub fn memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .map_err(|err| storage_error("failed to open in-memory database", err))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, Error> {
        // WAL is a no-op for in-memory databases.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.execute_batch(HISTORY_SCHEMA)
            .map_err(|err| storage_error("failed to initialize history schema", err))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends one decoding and returns the stored row.
    pub fn record(&self, input: &str, output: &[u64]) -> Result<HistoryEntry, Error> {
        let output_json = serde_json::to_string(output).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode output")
                .with_source(err)
        })?;
        let timestamp = now_rfc3339()?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO conversion_history (input_string, output_result, created_at) \
             VALUES (?1, ?2, ?3)",
            params![input, output_json, timestamp],
        )
        .map_err(|err| storage_error("failed to store conversion", err))?;

        Ok(HistoryEntry {
            id: conn.last_insert_rowid(),
            input: input.to_string(),
            output: output.to_vec(),
            timestamp,
        })
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, Error> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, input_string, output_result, created_at \
                 FROM conversion_history ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|err| storage_error("failed to prepare history query", err))?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|err| storage_error("failed to query history", err))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, input, output_json, timestamp) =
                row.map_err(|err| storage_error("failed to read history row", err))?;
            let output = serde_json::from_str(&output_json).map_err(|err| {
                Error::new(ErrorKind::Storage)
                    .with_message(format!("history row {id} has malformed output"))
                    .with_source(err)
            })?;
            entries.push(HistoryEntry {
                id,
                input,
                output,
                timestamp,
            });
        }
        Ok(entries)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

fn storage_error(message: &str, err: rusqlite::Error) -> Error {
    Error::new(ErrorKind::Storage)
        .with_message(message)
        .with_source(err)
}

fn now_rfc3339() -> Result<String, Error> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("timestamp format failed")
            .with_source(err)
    })
}
