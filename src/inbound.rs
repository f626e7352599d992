//! Inbound message spool
//!
//! The SMS gateway appends rows to the `inbound` table; the daemon polls for
//! rows past a persisted cursor and hands them to the engine. The cursor file
//! is written atomically so a crash never rewinds into replaying messages
//! with a torn value.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A message received from a punter
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: i64,
    pub sender: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Read-only poller over the inbound spool
pub struct InboundReader {
    db_path: PathBuf,
}

impl InboundReader {
    pub fn new(config: &Config) -> Self {
        Self {
            db_path: config.db_file.clone(),
        }
    }

    /// Open spool connection (read-only to avoid lock contention)
    fn open_db(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Get messages newer than the given id, oldest first
    pub fn poll(&self, since_id: i64) -> Result<Vec<InboundMessage>> {
        let conn = self.open_db()?;

        let mut stmt = conn.prepare(
            "SELECT id, sender, body, received_at FROM inbound WHERE id > ?1 ORDER BY id ASC",
        )?;

        let messages = stmt
            .query_map([since_id], |row| {
                Ok(InboundMessage {
                    id: row.get(0)?,
                    sender: row.get(1)?,
                    body: row.get(2)?,
                    received_at: store::parse_timestamp(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    /// The highest spool id (0 when the spool is empty)
    pub fn max_id(&self) -> Result<i64> {
        let conn = self.open_db()?;
        let id: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) FROM inbound", [], |row| {
            row.get(0)
        })?;
        Ok(id)
    }
}

/// Persisted position in the inbound spool
pub struct Cursor {
    path: PathBuf,
}

impl Cursor {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.cursor_file.clone(),
        }
    }

    /// Last processed spool id, or None if no cursor has been written yet
    pub fn load(&self) -> Result<Option<i64>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let id = content
            .trim()
            .parse()
            .map_err(|e| Error::Parse(format!("cursor file: {}", e)))?;
        Ok(Some(id))
    }

    /// Save the cursor atomically (temp file + rename)
    pub fn save(&self, id: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let parent = self.path.parent().unwrap_or(std::path::Path::new("."));
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(id.to_string().as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        Ok(())
    }
}
