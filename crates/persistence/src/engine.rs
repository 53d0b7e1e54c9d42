//! Create / update / patch / delete engines.
//!
//! The four write verbs orchestrate the extractor, catalog, history log,
//! reference graph, and compensation controller in a fixed order; any inner
//! failure triggers the matching rollback protocol. Writers on the same
//! `(type, id)` are serialised through a keyed mutex so version counters
//! never race in-process.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::SqlAdapter;
use crate::catalog;
use crate::error::{StoreError, StoreResult};
use crate::extract::{self, Extraction};
use crate::history::{self, HistoryOp};
use crate::naming::{self, quote_text, SqlValue};
use crate::read::{self, overwrite_meta};
use crate::references;
use crate::tx::TransactionContext;

/// Per-process write serialisation, keyed `Type/id`.
#[derive(Debug, Default)]
pub struct WriteLocks {
    inner: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriteLocks {
    fn cell(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock();
        Arc::clone(
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

/// Server-assigned resource id: UUID-v1 with the dashes stripped.
fn server_assigned_id() -> String {
    static NODE: OnceLock<[u8; 6]> = OnceLock::new();
    let node = NODE.get_or_init(|| {
        let bytes = *Uuid::new_v4().as_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]]
    });
    Uuid::now_v1(node).simple().to_string()
}

fn ensure_body(resource_type: &str, body: &Value) -> StoreResult<()> {
    let obj = body
        .as_object()
        .ok_or_else(|| StoreError::invalid("request body must be a JSON object"))?;
    match obj.get("resourceType").and_then(Value::as_str) {
        Some(rt) if rt == resource_type => Ok(()),
        Some(rt) => Err(StoreError::invalid(format!(
            "resourceType '{rt}' does not match '{resource_type}'"
        ))),
        None => Err(StoreError::invalid("resource is missing 'resourceType'")),
    }
}

async fn ensure_table(adapter: &SqlAdapter, resource_type: &str) -> StoreResult<()> {
    if adapter.has_table(&naming::table_name(resource_type)).await? {
        Ok(())
    } else {
        Err(StoreError::invalid(format!(
            "unsupported resource type '{resource_type}'"
        )))
    }
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                if key == "reference" {
                    if let Some(reference) = child.as_str() {
                        out.push(reference.to_string());
                    }
                } else {
                    collect_references(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

/// Checks that every embedded relative reference resolves to a live row.
async fn validate_references(adapter: &SqlAdapter, resource: &Value) -> StoreResult<()> {
    let mut refs = Vec::new();
    collect_references(resource, &mut refs);
    for reference in refs {
        let Some((target_type, target_id)) = extract::parse_relative_reference(&reference)
        else {
            // Absolute URLs and contained fragments are outside the graph.
            continue;
        };
        if !adapter
            .has_table(&naming::table_name(&target_type))
            .await?
            || !read::exists(adapter, &target_type, &target_id).await?
        {
            return Err(StoreError::InvalidReference { reference });
        }
    }
    Ok(())
}

fn metadata_literal(column: &str, now_literal: &str) -> Option<String> {
    match column {
        "CREATED_AT" | "UPDATED_AT" | "LAST_UPDATED" => Some(now_literal.to_string()),
        _ => None,
    }
}

async fn insert_main_row(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    version: i64,
    now: &DateTime<Utc>,
    blob: &[u8],
    extraction: &Extraction,
) -> StoreResult<()> {
    let table = naming::table_name(resource_type);
    let pk = naming::primary_key(resource_type);
    let dialect = adapter.dialect();
    let live = adapter.table_columns(&table).await?;
    let now_literal = SqlValue::Timestamp(*now).to_literal(dialect)?;

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for column in live.iter() {
        let literal = if *column == pk {
            quote_text(id)
        } else if column == "VERSION_ID" {
            version.to_string()
        } else if let Some(ts) = metadata_literal(column, &now_literal) {
            ts
        } else if column == "RESOURCE_JSON" {
            adapter.binary_literal(blob)
        } else if let Some(value) = extraction.columns.get(column) {
            value.to_literal(dialect)?
        } else {
            continue;
        };
        columns.push(column.clone());
        values.push(literal);
    }

    adapter
        .execute(&format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        ))
        .await?;
    Ok(())
}

async fn update_main_row(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    version: i64,
    now: &DateTime<Utc>,
    blob: &[u8],
    extraction: &Extraction,
) -> StoreResult<()> {
    let table = naming::table_name(resource_type);
    let pk = naming::primary_key(resource_type);
    let dialect = adapter.dialect();
    let live = adapter.table_columns(&table).await?;
    let now_literal = SqlValue::Timestamp(*now).to_literal(dialect)?;

    // Every non-key column is reassigned; a PUT replaces all fields, so
    // columns the new body no longer populates fall back to NULL.
    let mut assignments = Vec::new();
    for column in live.iter() {
        if *column == pk || column == "CREATED_AT" {
            continue;
        }
        let literal = if column == "VERSION_ID" {
            version.to_string()
        } else if let Some(ts) = metadata_literal(column, &now_literal) {
            ts
        } else if column == "RESOURCE_JSON" {
            adapter.binary_literal(blob)
        } else if let Some(value) = extraction.columns.get(column) {
            value.to_literal(dialect)?
        } else {
            "NULL".to_string()
        };
        assignments.push(format!("{column} = {literal}"));
    }

    adapter
        .execute(&format!(
            "UPDATE {table} SET {} WHERE {pk} = {}",
            assignments.join(", "),
            quote_text(id)
        ))
        .await?;
    Ok(())
}

/// Creates a resource (POST).
pub async fn create(
    adapter: &SqlAdapter,
    locks: &WriteLocks,
    resource_type: &str,
    mut body: Value,
    server_assigned_ids: bool,
) -> StoreResult<Value> {
    ensure_body(resource_type, &body)?;
    ensure_table(adapter, resource_type).await?;

    let id = if server_assigned_ids {
        server_assigned_id()
    } else {
        body.get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| StoreError::invalid("resource is missing 'id'"))?
    };

    let cell = locks.cell(&format!("{resource_type}/{id}"));
    let _guard = cell.lock().await;

    if read::exists(adapter, resource_type, &id).await? {
        return Err(StoreError::Conflict {
            resource_type: resource_type.to_string(),
            id,
        });
    }

    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.clone()));
    }

    let extraction = extract::extract(adapter, resource_type, &body).await?;
    validate_references(adapter, &body).await?;

    let blob = serde_json::to_vec(&body)?;
    let now = Utc::now();

    let mut ctx = TransactionContext::for_create(resource_type);
    insert_main_row(adapter, resource_type, &id, 1, &now, &blob, &extraction).await?;
    ctx.main_resource_id = Some(id.clone());

    let side_effects =
        write_side_effects(adapter, &mut ctx, resource_type, &id, &body, &blob, &extraction, HistoryOp::Post)
            .await;
    if let Err(e) = side_effects {
        ctx.rollback(adapter).await;
        return Err(e);
    }
    ctx.commit();

    tracing::debug!(resource_type, id = %id, "resource created");
    overwrite_meta(&mut body, 1, &now);
    Ok(body)
}

/// Replaces a resource (PUT). No create-on-update: a missing id is an error.
pub async fn update(
    adapter: &SqlAdapter,
    locks: &WriteLocks,
    resource_type: &str,
    id: &str,
    body: Value,
) -> StoreResult<Value> {
    ensure_body(resource_type, &body)?;
    ensure_table(adapter, resource_type).await?;

    let cell = locks.cell(&format!("{resource_type}/{id}"));
    let _guard = cell.lock().await;
    update_locked(adapter, resource_type, id, body).await
}

async fn update_locked(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    mut body: Value,
) -> StoreResult<Value> {
    if let Some(body_id) = body.get("id").and_then(Value::as_str) {
        if body_id != id {
            return Err(StoreError::invalid(format!(
                "body id '{body_id}' does not match '{id}'"
            )));
        }
    }

    let backup = read::fetch_row(adapter, resource_type, id)
        .await?
        .ok_or_else(|| StoreError::not_found(resource_type, id))?;
    let current_version = backup
        .int("VERSION_ID")
        .ok_or_else(|| StoreError::internal("resource row without VERSION_ID"))?;
    let new_version = current_version + 1;

    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.to_string()));
    }

    let mut ctx = TransactionContext::for_update(resource_type, id, backup);
    let result = apply_update(
        adapter,
        &mut ctx,
        resource_type,
        id,
        new_version,
        &body,
    )
    .await;

    match result {
        Ok(now) => {
            ctx.commit();
            tracing::debug!(resource_type, id, version = new_version, "resource updated");
            overwrite_meta(&mut body, new_version, &now);
            Ok(body)
        }
        Err(e) => {
            ctx.rollback(adapter).await;
            Err(e)
        }
    }
}

async fn apply_update(
    adapter: &SqlAdapter,
    ctx: &mut TransactionContext,
    resource_type: &str,
    id: &str,
    new_version: i64,
    body: &Value,
) -> StoreResult<DateTime<Utc>> {
    // Old edges go first; a retried update re-inserts them.
    for edge_id in references::edge_ids_by_source(adapter, resource_type, id).await? {
        references::delete_edge(adapter, &edge_id).await?;
        ctx.deleted_reference_ids.push(edge_id);
    }

    let extraction = extract::extract(adapter, resource_type, body).await?;
    validate_references(adapter, body).await?;

    let blob = serde_json::to_vec(body)?;
    let now = Utc::now();
    update_main_row(adapter, resource_type, id, new_version, &now, &blob, &extraction).await?;

    write_side_effects(adapter, ctx, resource_type, id, body, &blob, &extraction, HistoryOp::Put)
        .await?;
    Ok(now)
}

/// The post-row steps shared by create and update: catalog side-effects,
/// history, side-table rewrite, edge insertion.
#[allow(clippy::too_many_arguments)]
async fn write_side_effects(
    adapter: &SqlAdapter,
    ctx: &mut TransactionContext,
    resource_type: &str,
    id: &str,
    body: &Value,
    blob: &[u8],
    extraction: &Extraction,
    operation: HistoryOp,
) -> StoreResult<()> {
    if resource_type == "SearchParameter" {
        catalog::upsert_custom(adapter, body).await?;
    }
    history::append(adapter, resource_type, id, blob, operation).await?;
    extract::rewrite_index_rows(adapter, resource_type, id, &extraction.index_rows).await?;
    for edge in &extraction.edges {
        let edge_id = references::insert_edge(adapter, resource_type, id, edge).await?;
        ctx.saved_reference_ids.push(edge_id);
    }
    Ok(())
}

/// Shallow-merges the request over the stored document (PATCH), then runs
/// the update path. Returns the merged document.
pub async fn patch(
    adapter: &SqlAdapter,
    locks: &WriteLocks,
    resource_type: &str,
    id: &str,
    patch_body: Value,
) -> StoreResult<Value> {
    let patch_obj = patch_body
        .as_object()
        .ok_or_else(|| StoreError::invalid("patch body must be a JSON object"))?;
    if let Some(rt) = patch_obj.get("resourceType").and_then(Value::as_str) {
        if rt != resource_type {
            return Err(StoreError::invalid(format!(
                "resourceType '{rt}' does not match '{resource_type}'"
            )));
        }
    }
    ensure_table(adapter, resource_type).await?;

    let cell = locks.cell(&format!("{resource_type}/{id}"));
    let _guard = cell.lock().await;

    let mut merged = read::read(adapter, resource_type, id).await?;
    if let Some(target) = merged.as_object_mut() {
        for (key, value) in patch_obj {
            target.insert(key.clone(), value.clone());
        }
        target.insert(
            "resourceType".to_string(),
            Value::String(resource_type.to_string()),
        );
        target.insert("id".to_string(), Value::String(id.to_string()));
    }

    update_locked(adapter, resource_type, id, merged).await
}

/// Hard-deletes a resource (DELETE), retaining its history.
pub async fn delete(
    adapter: &SqlAdapter,
    locks: &WriteLocks,
    resource_type: &str,
    id: &str,
) -> StoreResult<()> {
    ensure_table(adapter, resource_type).await?;

    let cell = locks.cell(&format!("{resource_type}/{id}"));
    let _guard = cell.lock().await;

    let backup = read::fetch_row(adapter, resource_type, id)
        .await?
        .ok_or_else(|| StoreError::not_found(resource_type, id))?;
    let blob = backup
        .bytes("RESOURCE_JSON")
        .ok_or_else(|| StoreError::internal("resource row without RESOURCE_JSON"))?
        .to_vec();
    let edges = references::edges_by_source(adapter, resource_type, id).await?;

    let mut ctx = TransactionContext::for_delete(resource_type, id, backup, edges);
    let result = apply_delete(adapter, resource_type, id, &blob).await;

    match result {
        Ok(()) => {
            ctx.commit();
            tracing::debug!(resource_type, id, "resource deleted");
            Ok(())
        }
        Err(e) => {
            ctx.rollback(adapter).await;
            Err(e)
        }
    }
}

async fn apply_delete(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    blob: &[u8],
) -> StoreResult<()> {
    // History first: the last-known state survives even a partial failure.
    history::append(adapter, resource_type, id, blob, HistoryOp::Delete).await?;
    extract::delete_index_rows(adapter, resource_type, id).await?;

    if resource_type == "SearchParameter" {
        let resource: Value = serde_json::from_slice(blob)
            .map_err(|e| StoreError::internal(format!("corrupt resource blob: {e}")))?;
        catalog::remove_custom(adapter, &resource).await?;
    }

    references::delete_edges_by_source(adapter, resource_type, id).await?;

    let table = naming::table_name(resource_type);
    let pk = naming::primary_key(resource_type);
    adapter
        .execute(&format!(
            "DELETE FROM {table} WHERE {pk} = {}",
            quote_text(id)
        ))
        .await?;
    Ok(())
}
