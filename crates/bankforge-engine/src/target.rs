//! `SQLite` target store: the generated bank dataset.
//!
//! Each stage gets a table named after it holding `(key, body)`, where the
//! body is the row's JSON field map. The store is both the
//! [`BatchImporter`] and the executor's [`ReferenceSource`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use bankforge_types::row::Row;
use bankforge_types::state::StageName;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::ImportError;
use crate::import::{BatchImporter, ReferenceSource};

/// File- or memory-backed target database.
pub struct SqliteTargetStore {
    conn: Mutex<Connection>,
}

impl SqliteTargetStore {
    /// Open or create the target database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Open`] if the file or its directory cannot be
    /// created.
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ImportError::Open(Box::new(e)))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| ImportError::Open(Box::new(e)))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| ImportError::Open(Box::new(e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Open`] if `SQLite` cannot allocate it.
    pub fn in_memory() -> Result<Self, ImportError> {
        let conn = Connection::open_in_memory().map_err(|e| ImportError::Open(Box::new(e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, ImportError> {
        self.conn.lock().map_err(|_| ImportError::LockPoisoned)
    }

    /// Rows currently stored for `stage`; zero if nothing was imported.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] on read failure.
    pub fn row_count(&self, stage: &StageName) -> Result<u64, ImportError> {
        let table = table_name(stage)?;
        let conn = self.lock_conn()?;
        if !table_exists(&conn, stage)? {
            return Ok(0);
        }
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .map_err(|e| ImportError::backend(stage, e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Up to `limit` stored rows of `stage` with keys after `after`, in key
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] on read or decode failure.
    pub fn page_rows(
        &self,
        stage: &StageName,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Row>, ImportError> {
        let table = table_name(stage)?;
        let conn = self.lock_conn()?;
        if !table_exists(&conn, stage)? {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT key, body FROM {table} WHERE ?1 IS NULL OR key > ?1 ORDER BY key LIMIT ?2"
            ))
            .map_err(|e| ImportError::backend(stage, e))?;
        let raw = stmt
            .query_map(rusqlite::params![after, limit], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })
            .map_err(|e| ImportError::backend(stage, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ImportError::backend(stage, e))?;
        raw.into_iter()
            .map(|(key, body)| -> Result<Row, ImportError> {
                Ok(Row {
                    key,
                    fields: serde_json::from_str(&body)?,
                })
            })
            .collect()
    }

    /// Rows of `stage` whose `field` names a key missing from `parent`.
    /// Returns the total and the first `sample` offending row keys. Rows
    /// without the field are not counted.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] on read failure or a field name that is not
    /// a plain identifier.
    pub fn dangling_references(
        &self,
        stage: &StageName,
        field: &str,
        parent: &StageName,
        sample: usize,
    ) -> Result<(u64, Vec<String>), ImportError> {
        let table = table_name(stage)?;
        let parent_table = table_name(parent)?;
        if !StageName::new(field).is_identifier() {
            return Err(ImportError::Rejected {
                stage: stage.clone(),
                reason: format!("'{field}' is not a valid field name"),
            });
        }
        let conn = self.lock_conn()?;
        if !table_exists(&conn, stage)? {
            return Ok((0, Vec::new()));
        }
        let sql = if table_exists(&conn, parent)? {
            format!(
                "SELECT c.key FROM {table} c \
                 WHERE json_extract(c.body, ?1) IS NOT NULL \
                 AND NOT EXISTS (SELECT 1 FROM {parent_table} p \
                     WHERE p.key = json_extract(c.body, ?1)) \
                 ORDER BY c.key"
            )
        } else {
            format!(
                "SELECT c.key FROM {table} c WHERE json_extract(c.body, ?1) IS NOT NULL \
                 ORDER BY c.key"
            )
        };
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ImportError::backend(stage, e))?;
        let mut rows = stmt
            .query([format!("$.{field}")])
            .map_err(|e| ImportError::backend(stage, e))?;
        let (mut total, mut keys) = (0_u64, Vec::new());
        while let Some(row) = rows.next().map_err(|e| ImportError::backend(stage, e))? {
            total += 1;
            if keys.len() < sample {
                keys.push(row.get::<_, String>(0).map_err(|e| ImportError::backend(stage, e))?);
            }
        }
        Ok((total, keys))
    }
}

/// Quoted table identifier for `stage`.
fn table_name(stage: &StageName) -> Result<String, ImportError> {
    if stage.is_identifier() {
        Ok(format!("\"{}\"", stage.as_str()))
    } else {
        Err(ImportError::InvalidTable(stage.clone()))
    }
}

fn table_exists(conn: &Connection, stage: &StageName) -> Result<bool, ImportError> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [stage.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| ImportError::backend(stage, e))
}

impl BatchImporter for SqliteTargetStore {
    fn import(&self, stage: &StageName, rows: &[Row]) -> Result<u64, ImportError> {
        let table = table_name(stage)?;
        let bodies = rows
            .iter()
            .map(|r| serde_json::to_string(&r.fields))
            .collect::<Result<Vec<_>, _>>()?;
        let imported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| ImportError::backend(stage, e))?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                key TEXT PRIMARY KEY, \
                body TEXT NOT NULL, \
                imported_at TEXT NOT NULL\
            )"
        ))
        .map_err(|e| ImportError::backend(stage, e))?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR REPLACE INTO {table} (key, body, imported_at) VALUES (?1, ?2, ?3)"
                ))
                .map_err(|e| ImportError::backend(stage, e))?;
            for (row, body) in rows.iter().zip(&bodies) {
                stmt.execute(rusqlite::params![row.key, body, imported_at])
                    .map_err(|e| ImportError::backend(stage, e))?;
            }
        }
        tx.commit().map_err(|e| ImportError::backend(stage, e))?;
        Ok(rows.len() as u64)
    }
}

impl ReferenceSource for SqliteTargetStore {
    fn page_keys(
        &self,
        stage: &StageName,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, ImportError> {
        let table = table_name(stage)?;
        let conn = self.lock_conn()?;
        if !table_exists(&conn, stage)? {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT key FROM {table} WHERE ?1 IS NULL OR key > ?1 ORDER BY key LIMIT ?2"
            ))
            .map_err(|e| ImportError::backend(stage, e))?;
        let keys = stmt
            .query_map(rusqlite::params![after, limit], |r| r.get::<_, String>(0))
            .map_err(|e| ImportError::backend(stage, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ImportError::backend(stage, e))?;
        Ok(keys)
    }

    fn range_keys(
        &self,
        stage: &StageName,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<String>, ImportError> {
        let table = table_name(stage)?;
        let conn = self.lock_conn()?;
        if !table_exists(&conn, stage)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn
            .prepare(&format!(
                "SELECT key FROM {table} WHERE key >= ?1 AND (?2 IS NULL OR key < ?2) ORDER BY key"
            ))
            .map_err(|e| ImportError::backend(stage, e))?;
        let keys = stmt
            .query_map(rusqlite::params![start, end], |r| r.get::<_, String>(0))
            .map_err(|e| ImportError::backend(stage, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ImportError::backend(stage, e))?;
        Ok(keys)
    }
}
