//! Embedded backend executor over a pooled rusqlite connection.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;

use crate::error::{StoreError, StoreResult};
use crate::naming::Dialect;

use super::{Field, Record, SqlExecutor};

/// Executor for the embedded file database.
pub struct SqliteExecutor {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteExecutor {
    /// Opens or creates a database file.
    pub fn open(path: &str) -> StoreResult<Self> {
        Self::build(SqliteConnectionManager::file(path), false)
    }

    /// Opens a private in-memory database.
    ///
    /// A uniquely named shared-cache URI keeps every pooled connection on the
    /// same database; a plain `:memory:` path would give each connection its
    /// own.
    pub fn in_memory() -> StoreResult<Self> {
        let uri = format!(
            "file:vireo-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        );
        Self::build(SqliteConnectionManager::file(uri), true)
    }

    fn build(manager: SqliteConnectionManager, is_memory: bool) -> StoreResult<Self> {
        let pool = Pool::builder()
            .max_size(8)
            .min_idle(Some(1))
            .build(manager)
            .map_err(|e| StoreError::Internal {
                message: format!("failed to open embedded database: {e}"),
                source: Some(Box::new(e)),
            })?;
        {
            let conn = pool.get()?;
            conn.busy_timeout(std::time::Duration::from_millis(5000))?;
            // journal_mode is persisted in the database header; one
            // connection setting it covers the whole pool.
            if !is_memory {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
        }
        Ok(Self { pool })
    }

    fn connection(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> StoreResult<u64> {
        let conn = self.connection()?;
        let affected = conn.execute(sql, [])?;
        Ok(affected as u64)
    }

    async fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        let conn = self.connection()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> StoreResult<Vec<Record>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_uppercase())
            .collect();

        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, column) in columns.iter().enumerate() {
                let field = match row.get_ref(i)? {
                    ValueRef::Null => Field::Null,
                    ValueRef::Integer(v) => Field::Int(v),
                    ValueRef::Real(v) => Field::Float(v),
                    ValueRef::Text(t) => Field::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => Field::Bytes(b.to_vec()),
                };
                record.insert(column.clone(), field);
            }
            records.push(record);
        }
        Ok(records)
    }
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor").finish()
    }
}
