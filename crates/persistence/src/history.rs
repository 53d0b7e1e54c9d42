//! Append-only version history.
//!
//! Every write appends one row keyed `(type, id, version)`; version numbers
//! are `MAX + 1` per instance and survive hard deletes, so the log is the
//! durable record of everything that ever happened to a resource.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::adapter::SqlAdapter;
use crate::error::{StoreError, StoreResult};
use crate::naming::{self, quote_text, SqlValue};
use crate::read::overwrite_meta;
use crate::schema::HISTORY_TABLE;

/// The write verb recorded with each history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOp {
    Post,
    Put,
    Delete,
}

impl HistoryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryOp::Post => "POST",
            HistoryOp::Put => "PUT",
            HistoryOp::Delete => "DELETE",
        }
    }
}

/// One rehydrated history row.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub version: i64,
    pub operation: String,
    pub created_at: DateTime<Utc>,
    pub resource: Value,
}

/// Appends the next version for `(type, id)` and returns its number.
pub async fn append(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    blob: &[u8],
    operation: HistoryOp,
) -> StoreResult<i64> {
    let current = adapter
        .query_opt(&format!(
            "SELECT MAX(VERSION_ID) AS MAX_VERSION FROM {HISTORY_TABLE} \
             WHERE RESOURCE_TYPE = {} AND RESOURCE_ID = {}",
            quote_text(resource_type),
            quote_text(id)
        ))
        .await?
        .and_then(|row| row.int("MAX_VERSION"))
        .unwrap_or(0);
    let version = current + 1;

    let now = SqlValue::Timestamp(Utc::now()).to_literal(adapter.dialect())?;
    adapter
        .execute(&format!(
            "INSERT INTO {HISTORY_TABLE} \
             (RESOURCE_TYPE, RESOURCE_ID, VERSION_ID, OPERATION, CREATED_AT, RESOURCE_JSON) \
             VALUES ({}, {}, {version}, {}, {now}, {})",
            quote_text(resource_type),
            quote_text(id),
            quote_text(operation.as_str()),
            adapter.binary_literal(blob),
        ))
        .await?;
    Ok(version)
}

fn entry_from_record(record: &crate::adapter::Record) -> StoreResult<HistoryEntry> {
    let version = record
        .int("VERSION_ID")
        .ok_or_else(|| StoreError::internal("history row without VERSION_ID"))?;
    let operation = record
        .text("OPERATION")
        .unwrap_or_default()
        .to_string();
    let created_at = record
        .text("CREATED_AT")
        .and_then(naming::parse_db_timestamp)
        .unwrap_or_else(Utc::now);
    let blob = record
        .bytes("RESOURCE_JSON")
        .ok_or_else(|| StoreError::internal("history row without RESOURCE_JSON"))?;
    let mut resource: Value = serde_json::from_slice(blob)
        .map_err(|e| StoreError::internal(format!("corrupt history blob: {e}")))?;
    overwrite_meta(&mut resource, version, &created_at);
    Ok(HistoryEntry {
        version,
        operation,
        created_at,
        resource,
    })
}

/// Every version of an instance, newest first.
pub async fn versions(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
) -> StoreResult<Vec<HistoryEntry>> {
    let rows = adapter
        .query(&format!(
            "SELECT VERSION_ID, OPERATION, CREATED_AT, RESOURCE_JSON FROM {HISTORY_TABLE} \
             WHERE RESOURCE_TYPE = {} AND RESOURCE_ID = {} ORDER BY VERSION_ID DESC",
            quote_text(resource_type),
            quote_text(id)
        ))
        .await?;
    rows.iter().map(entry_from_record).collect()
}

/// A single version of an instance.
pub async fn version(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    version_id: i64,
) -> StoreResult<Option<HistoryEntry>> {
    let row = adapter
        .query_opt(&format!(
            "SELECT VERSION_ID, OPERATION, CREATED_AT, RESOURCE_JSON FROM {HISTORY_TABLE} \
             WHERE RESOURCE_TYPE = {} AND RESOURCE_ID = {} AND VERSION_ID = {version_id}",
            quote_text(resource_type),
            quote_text(id)
        ))
        .await?;
    row.as_ref().map(entry_from_record).transpose()
}
