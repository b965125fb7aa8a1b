//! Persistent inverted index over landmark hashes, plus track metadata (C5).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::StorageError;
use crate::hashing::HashRow;

/// `(hash32, track_id, t_frame)`.
pub type QueriedRow = (u32, String, i64);

pub struct FingerprintStore {
    conn: Mutex<Connection>,
}

impl FingerprintStore {
    /// Open (creating if absent) a SQLite-backed store at `path` and ensure
    /// its schema exists.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// An in-memory store, mainly useful for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    pub fn init(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tracks (
                track_id TEXT PRIMARY KEY,
                meta_json TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS hashes (
                hash32 INTEGER NOT NULL,
                track_id TEXT NOT NULL,
                t_frame INTEGER NOT NULL,
                FOREIGN KEY (track_id) REFERENCES tracks(track_id)
             );
             CREATE INDEX IF NOT EXISTS idx_hashes_hash32 ON hashes (hash32);
             CREATE INDEX IF NOT EXISTS idx_hashes_hash32_track ON hashes (hash32, track_id);",
        )?;
        Ok(())
    }

    pub fn upsert_track(&self, track_id: &str, meta: &Value) -> Result<(), StorageError> {
        let meta_json = serde_json::to_string(meta)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tracks (track_id, meta_json) VALUES (?1, ?2)
             ON CONFLICT(track_id) DO UPDATE SET meta_json = excluded.meta_json",
            params![track_id, meta_json],
        )?;
        Ok(())
    }

    /// Atomically delete all rows for `track_id` and insert `rows`. Either
    /// the prior set or the new set is observable afterward, never a mix.
    pub fn replace_hashes(&self, track_id: &str, rows: &[HashRow]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM hashes WHERE track_id = ?1", params![track_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO hashes (hash32, track_id, t_frame) VALUES (?1, ?2, ?3)",
            )?;
            for &(hash, t_frame) in rows {
                stmt.execute(params![hash, track_id, t_frame as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn all_tracks_meta(&self) -> Result<HashMap<String, Value>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT track_id, meta_json FROM tracks")?;
        let rows = stmt.query_map([], |row| {
            let track_id: String = row.get(0)?;
            let meta_json: String = row.get(1)?;
            Ok((track_id, meta_json))
        })?;

        let mut out = HashMap::new();
        for row in rows {
            let (track_id, meta_json) = row?;
            let meta: Value = serde_json::from_str(&meta_json)?;
            out.insert(track_id, meta);
        }
        Ok(out)
    }

    pub fn track_meta(&self, track_id: &str) -> Result<Option<Value>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let meta_json: Option<String> = conn
            .query_row(
                "SELECT meta_json FROM tracks WHERE track_id = ?1",
                params![track_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match meta_json {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    /// Every row whose `hash32` is in `values`. Duplicates preserved; `[]`
    /// input yields `[]`.
    pub fn query_hashes(&self, values: &[u32]) -> Result<Vec<QueriedRow>, StorageError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT hash32, track_id, t_frame FROM hashes WHERE hash32 IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
