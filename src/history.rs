use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::protocol::SearchRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Error,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "ok" {
            Outcome::Ok
        } else {
            Outcome::Error
        }
    }
}

/// One finished search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub request: SearchRequest,
    pub outcome: Outcome,
    pub paper_count: usize,
    pub created_at: i64,
}

pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request TEXT NOT NULL,
                outcome TEXT NOT NULL,
                paper_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(HistoryStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_entry(
        &self,
        request: &SearchRequest,
        outcome: Outcome,
        paper_count: usize,
    ) -> Result<i64, HistoryError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let request = serde_json::to_string(request)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO history (request, outcome, paper_count, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![request, outcome.as_str(), paper_count as i64, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_entries(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, request, outcome, paper_count, created_at
             FROM history
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, request, outcome, paper_count, created_at) = row?;
            match serde_json::from_str(&request) {
                Ok(request) => entries.push(HistoryEntry {
                    id,
                    request,
                    outcome: Outcome::parse(&outcome),
                    paper_count: paper_count.max(0) as usize,
                    created_at,
                }),
                Err(e) => tracing::warn!("skipping unreadable history entry {id}: {e}"),
            }
        }
        Ok(entries)
    }

    pub fn delete_entry(&self, id: i64) -> Result<(), HistoryError> {
        self.conn()
            .execute("DELETE FROM history WHERE id = ?1", params![id])?;
        Ok(())
    }
}
