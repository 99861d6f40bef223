use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        -- One row per chat session
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            created INTEGER NOT NULL,
            last_accessed INTEGER NOT NULL
        );

        -- Transcript, in conversation order
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            m_order INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT,
            tool_calls TEXT,
            tool_call_id TEXT,
            tool_name TEXT,
            created INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
                ON DELETE CASCADE
                ON UPDATE CASCADE,
            UNIQUE(session_id, m_order)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, m_order);
    ")?;

    Ok(())
}
