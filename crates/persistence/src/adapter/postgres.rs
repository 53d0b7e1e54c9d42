//! Networked backend executor over a deadpool-managed PostgreSQL pool.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::Type;
use tokio_postgres::NoTls;

use crate::error::{StoreError, StoreResult};
use crate::naming::Dialect;

use super::{Field, Record, SqlExecutor};

/// Executor for PostgreSQL.
pub struct PostgresExecutor {
    pool: Pool,
}

/// Server-side statement timeout carried by every pooled connection.
const STATEMENT_TIMEOUT_MS: u32 = 30_000;

impl PostgresExecutor {
    /// Builds a pool from a `postgres://` connection string. Explicit user
    /// and password settings override anything carried in the URL.
    pub fn connect(url: &str, user: Option<&str>, password: Option<&str>) -> StoreResult<Self> {
        let mut config: tokio_postgres::Config =
            url.parse().map_err(|e: tokio_postgres::Error| {
                StoreError::Internal {
                    message: format!("invalid database URL: {e}"),
                    source: Some(Box::new(e)),
                }
            })?;
        if let Some(user) = user {
            config.user(user);
        }
        if let Some(password) = password {
            config.password(password);
        }
        // Startup options reach every connection the pool opens; a URL that
        // carries its own options wins.
        if config.get_options().is_none() {
            config.options(&format!("-c statement_timeout={STATEMENT_TIMEOUT_MS}"));
        }

        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(16)
            .build()
            .map_err(|e| StoreError::Internal {
                message: format!("failed to build connection pool: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { pool })
    }

    fn decode(row: &tokio_postgres::Row) -> StoreResult<Record> {
        let mut record = Record::new();
        for (i, column) in row.columns().iter().enumerate() {
            let name = column.name().to_uppercase();
            let ty = column.type_();
            let field = if *ty == Type::BOOL {
                match row.try_get::<_, Option<bool>>(i)? {
                    Some(b) => Field::Int(b as i64),
                    None => Field::Null,
                }
            } else if *ty == Type::INT2 {
                match row.try_get::<_, Option<i16>>(i)? {
                    Some(v) => Field::Int(v as i64),
                    None => Field::Null,
                }
            } else if *ty == Type::INT4 {
                match row.try_get::<_, Option<i32>>(i)? {
                    Some(v) => Field::Int(v as i64),
                    None => Field::Null,
                }
            } else if *ty == Type::INT8 {
                match row.try_get::<_, Option<i64>>(i)? {
                    Some(v) => Field::Int(v),
                    None => Field::Null,
                }
            } else if *ty == Type::FLOAT4 {
                match row.try_get::<_, Option<f32>>(i)? {
                    Some(v) => Field::Float(v as f64),
                    None => Field::Null,
                }
            } else if *ty == Type::FLOAT8 {
                match row.try_get::<_, Option<f64>>(i)? {
                    Some(v) => Field::Float(v),
                    None => Field::Null,
                }
            } else if *ty == Type::BYTEA {
                match row.try_get::<_, Option<Vec<u8>>>(i)? {
                    Some(v) => Field::Bytes(v),
                    None => Field::Null,
                }
            } else if *ty == Type::DATE {
                match row.try_get::<_, Option<NaiveDate>>(i)? {
                    Some(d) => Field::Text(d.format("%Y-%m-%d").to_string()),
                    None => Field::Null,
                }
            } else if *ty == Type::TIMESTAMP {
                match row.try_get::<_, Option<NaiveDateTime>>(i)? {
                    Some(ts) => Field::Text(ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
                    None => Field::Null,
                }
            } else if *ty == Type::TIMESTAMPTZ {
                match row.try_get::<_, Option<DateTime<Utc>>>(i)? {
                    Some(ts) => Field::Text(ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
                    None => Field::Null,
                }
            } else {
                match row.try_get::<_, Option<String>>(i)? {
                    Some(s) => Field::Text(s),
                    None => Field::Null,
                }
            };
            record.insert(name, field);
        }
        Ok(record)
    }
}

#[async_trait]
impl SqlExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str) -> StoreResult<u64> {
        let client = self.pool.get().await?;
        Ok(client.execute(sql, &[]).await?)
    }

    async fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> StoreResult<Vec<Record>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql, &[]).await?;
        rows.iter().map(Self::decode).collect()
    }
}

impl std::fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresExecutor").finish()
    }
}
