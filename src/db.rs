use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::ingest::{UploadMeta, UploadPayload};

/// Bounded history: inserting an upload past this count evicts the oldest.
pub const HISTORY_LIMIT: usize = 20;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("classperf.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // History ordering rides on rowid; created_at is informational only.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS uploads(
            id TEXT PRIMARY KEY,
            meta TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// Insert a payload and trim history to the most recent HISTORY_LIMIT rows.
/// Eviction removes the payload along with its history entry; there is no
/// orphaned state to clean up later.
pub fn save_upload(conn: &Connection, payload: &UploadPayload) -> anyhow::Result<()> {
    let meta_json = serde_json::to_string(&payload.meta)?;
    let payload_json = serde_json::to_string(payload)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO uploads(id, meta, payload, created_at) VALUES(?, ?, ?, ?)",
        (
            &payload.meta.id,
            &meta_json,
            &payload_json,
            &payload.meta.created_at,
        ),
    )?;
    tx.execute(
        &format!(
            "DELETE FROM uploads WHERE id NOT IN (
                SELECT id FROM uploads ORDER BY rowid DESC LIMIT {}
            )",
            HISTORY_LIMIT
        ),
        [],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn get_upload(conn: &Connection, id: &str) -> anyhow::Result<Option<UploadPayload>> {
    let raw: Option<String> = conn
        .query_row("SELECT payload FROM uploads WHERE id = ?", [id], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Most-recent-first list of upload summaries.
pub fn history(conn: &Connection) -> anyhow::Result<Vec<UploadMeta>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT meta FROM uploads ORDER BY rowid DESC LIMIT {}",
        HISTORY_LIMIT
    ))?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;

    let mut out = Vec::new();
    for raw in rows {
        out.push(serde_json::from_str(&raw?)?);
    }
    Ok(out)
}

/// Returns false when the id was not present.
pub fn delete_upload(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM uploads WHERE id = ?", [id])?;
    Ok(n > 0)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &serde_json::to_string(value)?),
    )?;
    Ok(())
}
