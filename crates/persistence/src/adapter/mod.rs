//! SQL adapter: the narrow seam between the engine and the two backends.
//!
//! Everything above this module talks SQL through [`SqlAdapter`] only. The
//! adapter hides the dialect differences that matter here: the column
//! introspection query, binary-literal syntax, and mass-clear semantics.
//! Statements arrive fully rendered (see [`crate::naming`]); there is no
//! parameter binding across this seam.

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::naming::{self, Dialect};

/// One cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Field {
    /// Renders the field back into a SQL literal, used when re-materialising
    /// backed-up rows during compensation.
    pub fn to_literal(&self, dialect: Dialect) -> String {
        match self {
            Field::Null => "NULL".to_string(),
            Field::Int(i) => i.to_string(),
            Field::Float(f) => f.to_string(),
            Field::Text(s) => naming::quote_text(s),
            Field::Bytes(b) => naming::binary_literal(dialect, b),
        }
    }
}

/// A schema-driven row image: uppercase column name to field value.
///
/// Both executors normalise column names to uppercase so the engine sees one
/// casing regardless of how the backend folds identifiers.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: BTreeMap<String, Field>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, field: Field) {
        self.fields.insert(column.into(), field);
    }

    pub fn get(&self, column: &str) -> Option<&Field> {
        self.fields.get(column)
    }

    /// The field as text, when it is text.
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.fields.get(column) {
            Some(Field::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// The field as an integer, accepting numeric text.
    pub fn int(&self, column: &str) -> Option<i64> {
        match self.fields.get(column) {
            Some(Field::Int(i)) => Some(*i),
            Some(Field::Float(f)) => Some(*f as i64),
            Some(Field::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// The field as raw bytes; text is handed back as its UTF-8 bytes.
    pub fn bytes(&self, column: &str) -> Option<&[u8]> {
        match self.fields.get(column) {
            Some(Field::Bytes(b)) => Some(b),
            Some(Field::Text(s)) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Iterates `(column, field)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The executor seam implemented once per backend.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// The dialect this executor speaks.
    fn dialect(&self) -> Dialect;

    /// Executes a single statement, returning the affected-row count.
    async fn execute(&self, sql: &str) -> StoreResult<u64>;

    /// Executes a batch of `;`-separated statements (DDL bootstrap).
    async fn execute_batch(&self, sql: &str) -> StoreResult<()>;

    /// Runs a query and materialises every row.
    async fn query(&self, sql: &str) -> StoreResult<Vec<Record>>;
}

/// The adapter every other component talks to.
pub struct SqlAdapter {
    executor: Box<dyn SqlExecutor>,
    column_cache: Mutex<HashMap<String, Arc<Vec<String>>>>,
}

impl SqlAdapter {
    /// Wraps an executor.
    pub fn new(executor: Box<dyn SqlExecutor>) -> Self {
        Self {
            executor,
            column_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Opens or creates a file-backed embedded database.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(path: &str) -> StoreResult<Self> {
        Ok(Self::new(Box::new(SqliteExecutor::open(path)?)))
    }

    /// Opens a private in-memory embedded database (tests, demos).
    #[cfg(feature = "sqlite")]
    pub fn sqlite_in_memory() -> StoreResult<Self> {
        Ok(Self::new(Box::new(SqliteExecutor::in_memory()?)))
    }

    /// Connects to PostgreSQL. `url` is a `postgres://` connection string;
    /// explicit user/password settings override anything in the URL.
    #[cfg(feature = "postgres")]
    pub fn postgres(
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> StoreResult<Self> {
        Ok(Self::new(Box::new(PostgresExecutor::connect(
            url, user, password,
        )?)))
    }

    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    pub async fn execute(&self, sql: &str) -> StoreResult<u64> {
        self.executor.execute(sql).await
    }

    pub async fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.executor.execute_batch(sql).await
    }

    pub async fn query(&self, sql: &str) -> StoreResult<Vec<Record>> {
        self.executor.query(sql).await
    }

    /// Runs a query expected to produce at most one row.
    pub async fn query_opt(&self, sql: &str) -> StoreResult<Option<Record>> {
        Ok(self.executor.query(sql).await?.into_iter().next())
    }

    /// Renders a byte blob as a binary literal for the active backend.
    pub fn binary_literal(&self, bytes: &[u8]) -> String {
        naming::binary_literal(self.dialect(), bytes)
    }

    /// The live column list of a table, uppercased, cached per table.
    ///
    /// An unknown table yields an empty list, which is never cached, so a
    /// table created later is picked up on the next call.
    pub async fn table_columns(&self, table: &str) -> StoreResult<Arc<Vec<String>>> {
        if let Some(columns) = self.column_cache.lock().get(table) {
            return Ok(Arc::clone(columns));
        }

        let sql = match self.dialect() {
            Dialect::Sqlite => format!(
                "SELECT name AS COLUMN_NAME FROM pragma_table_info('{}')",
                table.replace('\'', "''")
            ),
            Dialect::Postgres => format!(
                "SELECT UPPER(column_name) AS COLUMN_NAME FROM information_schema.columns \
                 WHERE UPPER(table_name) = UPPER('{}') AND table_schema = current_schema()",
                table.replace('\'', "''")
            ),
        };

        let rows = self.executor.query(&sql).await?;
        let columns: Vec<String> = rows
            .iter()
            .filter_map(|row| row.text("COLUMN_NAME"))
            .map(|name| name.to_uppercase())
            .collect();
        let columns = Arc::new(columns);

        if !columns.is_empty() {
            self.column_cache
                .lock()
                .insert(table.to_string(), Arc::clone(&columns));
        }
        Ok(columns)
    }

    /// True when the resource type has a backing table in the live schema.
    pub async fn has_table(&self, table: &str) -> StoreResult<bool> {
        Ok(!self.table_columns(table).await?.is_empty())
    }

    /// Clears every listed table: `TRUNCATE ... CASCADE` on PostgreSQL,
    /// serial `DELETE` on the embedded backend.
    pub async fn clear_tables(&self, tables: &[String]) -> StoreResult<()> {
        if tables.is_empty() {
            return Ok(());
        }
        match self.dialect() {
            Dialect::Postgres => {
                let list = tables.join(", ");
                self.executor
                    .execute(&format!("TRUNCATE {list} CASCADE"))
                    .await?;
            }
            Dialect::Sqlite => {
                for table in tables {
                    self.executor
                        .execute(&format!("DELETE FROM {table}"))
                        .await?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlAdapter")
            .field("dialect", &self.dialect())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_and_query_roundtrip() {
        let adapter = SqlAdapter::sqlite_in_memory().unwrap();
        adapter
            .execute("CREATE TABLE Sample (ID TEXT, N INTEGER)")
            .await
            .unwrap();
        adapter
            .execute("INSERT INTO Sample (ID, N) VALUES ('a', 7)")
            .await
            .unwrap();

        let row = adapter
            .query_opt("SELECT ID, N FROM Sample")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.text("ID"), Some("a"));
        assert_eq!(row.int("N"), Some(7));
    }

    #[tokio::test]
    async fn table_columns_are_introspected_and_cached() {
        let adapter = SqlAdapter::sqlite_in_memory().unwrap();
        adapter
            .execute("CREATE TABLE Sample (ID TEXT, VERSION_ID INTEGER)")
            .await
            .unwrap();

        let cols = adapter.table_columns("Sample").await.unwrap();
        assert_eq!(cols.as_slice(), &["ID", "VERSION_ID"]);

        // Second call is served from the cache.
        let again = adapter.table_columns("Sample").await.unwrap();
        assert!(Arc::ptr_eq(&cols, &again));
    }

    #[tokio::test]
    async fn unknown_table_is_not_cached() {
        let adapter = SqlAdapter::sqlite_in_memory().unwrap();
        assert!(!adapter.has_table("Missing").await.unwrap());

        adapter
            .execute("CREATE TABLE Missing (ID TEXT)")
            .await
            .unwrap();
        assert!(adapter.has_table("Missing").await.unwrap());
    }

    #[tokio::test]
    async fn blob_roundtrip_via_binary_literal() {
        let adapter = SqlAdapter::sqlite_in_memory().unwrap();
        adapter
            .execute("CREATE TABLE Blobs (DATA BLOB)")
            .await
            .unwrap();
        let payload = br#"{"resourceType":"Patient"}"#;
        let literal = adapter.binary_literal(payload);
        adapter
            .execute(&format!("INSERT INTO Blobs (DATA) VALUES ({literal})"))
            .await
            .unwrap();

        let row = adapter
            .query_opt("SELECT DATA FROM Blobs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.bytes("DATA"), Some(payload.as_slice()));
    }
}
