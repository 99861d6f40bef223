mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::message::{Message, Role, ToolCall};

/// SQLite transcript store. Sessions live in memory; this is the audit copy.
#[derive(Clone, Debug)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening transcript database {}", path.display()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        schema::create_tables(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// Records a session the first time it is seen; later calls only touch it.
    pub fn ensure_session(&self, session_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = now_secs()?;

        conn.execute(
            "INSERT INTO sessions (id, created, last_accessed) VALUES (?1, ?2, ?2)
             ON CONFLICT(id) DO UPDATE SET last_accessed = excluded.last_accessed",
            rusqlite::params![session_id, now],
        )?;

        Ok(())
    }

    /// Stores `messages` as entries `first_order..` of the session transcript.
    pub fn append_messages(&self, session_id: &str, first_order: usize, messages: &[Message]) -> Result<()> {
        let mut conn = self.lock()?;
        let now = now_secs()?;
        let tx = conn.transaction()?;

        for (offset, message) in messages.iter().enumerate() {
            let tool_calls = message
                .tool_calls
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            tx.execute(
                "INSERT INTO messages (session_id, m_order, role, content, tool_calls, tool_call_id, tool_name, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    session_id,
                    (first_order + offset) as i64,
                    message.role.as_str(),
                    message.content,
                    tool_calls,
                    message.tool_call_id,
                    message.tool_name,
                    now
                ],
            )?;
        }

        tx.execute(
            "UPDATE sessions SET last_accessed = ?1 WHERE id = ?2",
            rusqlite::params![now, session_id],
        )?;
        tx.commit()?;

        Ok(())
    }

    pub fn load_transcript(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, tool_calls, tool_call_id, tool_name FROM messages
             WHERE session_id = ?1
             ORDER BY m_order",
        )?;

        let rows = stmt.query_map(rusqlite::params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, tool_calls, tool_call_id, tool_name) = row?;
            let role = Role::parse(&role).ok_or_else(|| anyhow::anyhow!("Unknown role '{}' in transcript", role))?;
            let tool_calls = tool_calls
                .map(|raw| serde_json::from_str::<Vec<ToolCall>>(&raw))
                .transpose()?;

            messages.push(Message {
                role,
                content,
                tool_calls,
                tool_call_id,
                tool_name,
            });
        }

        Ok(messages)
    }

    pub fn session_exists(&self, session_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                rusqlite::params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn now_secs() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transcript() -> Vec<Message> {
        vec![
            Message::user("show me your repos"),
            Message::assistant_calls(None, vec![ToolCall::new("c1", "list-repositories", json!({}))]),
            Message::tool_result("c1", "list-repositories", "RepoA: desc"),
            Message::assistant("You have RepoA."),
        ]
    }

    #[test]
    fn transcript_survives_a_round_trip_in_order() {
        let db = Db::in_memory().unwrap();
        db.ensure_session("s1").unwrap();

        let messages = transcript();
        db.append_messages("s1", 0, &messages[..2]).unwrap();
        db.append_messages("s1", 2, &messages[2..]).unwrap();

        assert_eq!(db.load_transcript("s1").unwrap(), messages);
        assert!(db.load_transcript("other").unwrap().is_empty());
    }

    #[test]
    fn reusing_an_order_slot_is_rejected() {
        let db = Db::in_memory().unwrap();
        db.ensure_session("s1").unwrap();
        db.append_messages("s1", 0, &[Message::user("hey")]).unwrap();

        assert!(db.append_messages("s1", 0, &[Message::user("hey")]).is_err());
        assert_eq!(db.load_transcript("s1").unwrap().len(), 1);
    }

    #[test]
    fn ensure_session_is_idempotent() {
        let db = Db::in_memory().unwrap();

        db.ensure_session("s1").unwrap();
        db.ensure_session("s1").unwrap();

        assert!(db.session_exists("s1").unwrap());
        assert!(!db.session_exists("s2").unwrap());
    }

    #[test]
    fn file_database_is_created_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flux.db");

        let db = Db::open(&path).unwrap();
        db.ensure_session("s1").unwrap();

        assert!(path.exists());
    }
}
