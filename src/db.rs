use anyhow::Context;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::StoreError;
use crate::model::{LedgerKey, LedgerRecord};
use crate::store::DocumentStore;

pub const DB_FILE: &str = "lectured.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("open {}", db_path.display()))?;

    // Several sidecars may share a workspace; writers wait instead of failing.
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    init_schema(&conn).context("initialise workspace schema")?;
    info!(path = %db_path.display(), "workspace database opened");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_records(
            chapter_id TEXT NOT NULL,
            branch_id TEXT NOT NULL,
            record_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            doc TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(chapter_id, branch_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_records_record_id ON ledger_records(record_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty_assignments(
            faculty TEXT NOT NULL,
            chapter TEXT NOT NULL,
            branch TEXT NOT NULL,
            PRIMARY KEY(faculty, chapter, branch)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_faculty_assignments_chapter ON faculty_assignments(chapter, branch)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chapter_requirements(
            chapter TEXT PRIMARY KEY,
            required_raw TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Ledger records kept as JSON documents, one row per key.
///
/// The `version` column is authoritative; conditional puts compare against it
/// in the same statement that writes, so two connections racing on one key
/// cannot both succeed.
pub struct SqliteDocumentStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteDocumentStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn current_version(&self, key: &LedgerKey) -> Result<Option<u64>, StoreError> {
        let v = self
            .conn
            .query_row(
                "SELECT version FROM ledger_records WHERE chapter_id = ?1 AND branch_id = ?2",
                params![key.chapter_id, key.branch_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(v.map(|v| v as u64))
    }
}

fn decode(key: LedgerKey, doc: &str, version: i64) -> Result<LedgerRecord, StoreError> {
    let mut record: LedgerRecord =
        serde_json::from_str(doc).map_err(|e| StoreError::Corrupt {
            key,
            message: e.to_string(),
        })?;
    record.version = version as u64;
    Ok(record)
}

fn encode(record: &LedgerRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
        key: record.key.clone(),
        message: e.to_string(),
    })
}

impl DocumentStore for SqliteDocumentStore<'_> {
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT doc, version FROM ledger_records WHERE chapter_id = ?1 AND branch_id = ?2",
                params![key.chapter_id, key.branch_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        row.map(|(doc, version)| decode(key.clone(), &doc, version))
            .transpose()
    }

    fn put(&self, record: &LedgerRecord, expected: Option<u64>) -> Result<(), StoreError> {
        let doc = encode(record)?;
        let updated_at = record.updated_at.to_rfc3339();
        let key = &record.key;

        match expected {
            None => {
                let res = self.conn.execute(
                    "INSERT INTO ledger_records(chapter_id, branch_id, record_id, version, doc, updated_at)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        key.chapter_id,
                        key.branch_id,
                        record.record_id,
                        record.version as i64,
                        doc,
                        updated_at
                    ],
                );
                match res {
                    Ok(_) => Ok(()),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Err(StoreError::Conflict {
                            key: key.clone(),
                            expected,
                            found: self.current_version(key)?,
                        })
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Some(v) => {
                let n = self.conn.execute(
                    "UPDATE ledger_records SET version = ?1, doc = ?2, updated_at = ?3
                     WHERE chapter_id = ?4 AND branch_id = ?5 AND version = ?6",
                    params![
                        record.version as i64,
                        doc,
                        updated_at,
                        key.chapter_id,
                        key.branch_id,
                        v as i64
                    ],
                )?;
                if n == 0 {
                    return Err(StoreError::Conflict {
                        key: key.clone(),
                        expected,
                        found: self.current_version(key)?,
                    });
                }
                Ok(())
            }
        }
    }

    fn delete(&self, key: &LedgerKey) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM ledger_records WHERE chapter_id = ?1 AND branch_id = ?2",
            params![key.chapter_id, key.branch_id],
        )?;
        Ok(n > 0)
    }

    fn list_all(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT chapter_id, branch_id, doc, version FROM ledger_records
             ORDER BY chapter_id, branch_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    LedgerKey {
                        chapter_id: row.get(0)?,
                        branch_id: row.get(1)?,
                    },
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(key, doc, version)| decode(key, &doc, version))
            .collect()
    }
}
