use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide database handle. A single connection behind a mutex keeps
/// all mutation single-writer; WAL keeps readers cheap.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and initialise the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Idempotent; safe to run on every startup.
fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat (
            id        INTEGER PRIMARY KEY,
            limb      TEXT NOT NULL,
            chat_type TEXT NOT NULL,
            title     TEXT NOT NULL,
            UNIQUE(limb)
        );
        CREATE INDEX IF NOT EXISTS idx_title ON chat (title);

        CREATE TABLE IF NOT EXISTS link (
            id          INTEGER PRIMARY KEY,
            master_limb TEXT NOT NULL,
            slave_limb  TEXT NOT NULL,
            UNIQUE(master_limb, slave_limb)
        );

        CREATE TABLE IF NOT EXISTS topic (
            id          INTEGER PRIMARY KEY,
            master_limb TEXT NOT NULL,
            slave_limb  TEXT NOT NULL,
            topic_id    INTEGER NOT NULL,
            UNIQUE(master_limb, slave_limb)
        );

        CREATE TABLE IF NOT EXISTS message (
            id                   INTEGER PRIMARY KEY,
            master_limb          TEXT NOT NULL,
            master_msg_id        TEXT NOT NULL,
            master_msg_thread_id TEXT NOT NULL,
            slave_limb           TEXT NOT NULL,
            slave_msg_id         TEXT NOT NULL,
            slave_sender         TEXT NOT NULL,
            content              TEXT NOT NULL,
            timestamp            INTEGER NOT NULL,
            created              DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(master_limb, master_msg_id)
        );
        CREATE INDEX IF NOT EXISTS idx_slave_reply ON message (slave_limb, timestamp);
        CREATE INDEX IF NOT EXISTS idx_master_reply ON message (master_limb, master_msg_id);",
    )?;
    Ok(())
}
