//! Reference graph store.
//!
//! Edges in the `"REFERENCES"` table are the only source of truth for
//! reference-based search, `_include`/`_revinclude` traversal, and delete
//! compensation. Search-by-reference deliberately ignores the stored
//! `SOURCE_EXPRESSION`; only include traversals filter on it, because there
//! the caller knows which leaf field it is following.

use chrono::Utc;
use uuid::Uuid;

use crate::adapter::{Record, SqlAdapter};
use crate::error::StoreResult;
use crate::extract::PendingEdge;
use crate::naming::{quote_text, SqlValue};
use crate::schema::REFERENCES_TABLE;

/// Inserts one edge and returns its generated id.
pub async fn insert_edge(
    adapter: &SqlAdapter,
    source_type: &str,
    source_id: &str,
    edge: &PendingEdge,
) -> StoreResult<String> {
    let id = Uuid::new_v4().simple().to_string();
    let now = SqlValue::Timestamp(Utc::now()).to_literal(adapter.dialect())?;
    let display = match &edge.display {
        Some(d) => quote_text(d),
        None => "NULL".to_string(),
    };
    let sql = format!(
        "INSERT INTO {REFERENCES_TABLE} \
         (ID, SOURCE_RESOURCE_TYPE, SOURCE_RESOURCE_ID, SOURCE_EXPRESSION, \
          TARGET_RESOURCE_TYPE, TARGET_RESOURCE_ID, DISPLAY_VALUE, \
          CREATED_AT, UPDATED_AT, LAST_UPDATED) \
         VALUES ({}, {}, {}, {}, {}, {}, {display}, {now}, {now}, {now})",
        quote_text(&id),
        quote_text(source_type),
        quote_text(source_id),
        quote_text(&edge.expression),
        quote_text(&edge.target_type),
        quote_text(&edge.target_id),
    );
    adapter.execute(&sql).await?;
    Ok(id)
}

/// Deletes one edge by id.
pub async fn delete_edge(adapter: &SqlAdapter, id: &str) -> StoreResult<()> {
    adapter
        .execute(&format!(
            "DELETE FROM {REFERENCES_TABLE} WHERE ID = {}",
            quote_text(id)
        ))
        .await?;
    Ok(())
}

/// Ids of every edge leaving a resource.
pub async fn edge_ids_by_source(
    adapter: &SqlAdapter,
    source_type: &str,
    source_id: &str,
) -> StoreResult<Vec<String>> {
    let rows = adapter
        .query(&format!(
            "SELECT ID FROM {REFERENCES_TABLE} \
             WHERE SOURCE_RESOURCE_TYPE = {} AND SOURCE_RESOURCE_ID = {}",
            quote_text(source_type),
            quote_text(source_id)
        ))
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.text("ID").map(String::from))
        .collect())
}

/// Full edge rows leaving a resource, used to back up before a delete.
pub async fn edges_by_source(
    adapter: &SqlAdapter,
    source_type: &str,
    source_id: &str,
) -> StoreResult<Vec<Record>> {
    adapter
        .query(&format!(
            "SELECT * FROM {REFERENCES_TABLE} \
             WHERE SOURCE_RESOURCE_TYPE = {} AND SOURCE_RESOURCE_ID = {}",
            quote_text(source_type),
            quote_text(source_id)
        ))
        .await
}

/// Deletes every edge leaving a resource.
pub async fn delete_edges_by_source(
    adapter: &SqlAdapter,
    source_type: &str,
    source_id: &str,
) -> StoreResult<u64> {
    adapter
        .execute(&format!(
            "DELETE FROM {REFERENCES_TABLE} \
             WHERE SOURCE_RESOURCE_TYPE = {} AND SOURCE_RESOURCE_ID = {}",
            quote_text(source_type),
            quote_text(source_id)
        ))
        .await
}

/// Distinct source ids of `source_type` holding an edge to the target.
///
/// No `SOURCE_EXPRESSION` filter: any reference parameter's edge counts.
pub async fn sources_referencing(
    adapter: &SqlAdapter,
    source_type: &str,
    target_type: &str,
    target_id: &str,
) -> StoreResult<Vec<String>> {
    let rows = adapter
        .query(&format!(
            "SELECT DISTINCT SOURCE_RESOURCE_ID FROM {REFERENCES_TABLE} \
             WHERE SOURCE_RESOURCE_TYPE = {} AND TARGET_RESOURCE_TYPE = {} \
             AND TARGET_RESOURCE_ID = {}",
            quote_text(source_type),
            quote_text(target_type),
            quote_text(target_id)
        ))
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.text("SOURCE_RESOURCE_ID").map(String::from))
        .collect())
}

/// Distinct `(type, id)` targets of a resource's outgoing edges, optionally
/// narrowed to one leaf field and one target type (the `_include` walk).
pub async fn distinct_targets(
    adapter: &SqlAdapter,
    source_type: &str,
    source_id: &str,
    expression: Option<&str>,
    target_type: Option<&str>,
) -> StoreResult<Vec<(String, String)>> {
    let mut sql = format!(
        "SELECT DISTINCT TARGET_RESOURCE_TYPE, TARGET_RESOURCE_ID FROM {REFERENCES_TABLE} \
         WHERE SOURCE_RESOURCE_TYPE = {} AND SOURCE_RESOURCE_ID = {}",
        quote_text(source_type),
        quote_text(source_id)
    );
    if let Some(expression) = expression {
        sql.push_str(&format!(" AND SOURCE_EXPRESSION = {}", quote_text(expression)));
    }
    if let Some(target_type) = target_type {
        sql.push_str(&format!(
            " AND TARGET_RESOURCE_TYPE = {}",
            quote_text(target_type)
        ));
    }
    let rows = adapter.query(&sql).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            Some((
                row.text("TARGET_RESOURCE_TYPE")?.to_string(),
                row.text("TARGET_RESOURCE_ID")?.to_string(),
            ))
        })
        .collect())
}

/// Distinct `(type, id)` sources pointing at a target, optionally narrowed to
/// one leaf field and one source type (the `_revinclude` walk).
pub async fn distinct_sources(
    adapter: &SqlAdapter,
    target_type: &str,
    target_id: &str,
    expression: Option<&str>,
    source_type: Option<&str>,
) -> StoreResult<Vec<(String, String)>> {
    let mut sql = format!(
        "SELECT DISTINCT SOURCE_RESOURCE_TYPE, SOURCE_RESOURCE_ID FROM {REFERENCES_TABLE} \
         WHERE TARGET_RESOURCE_TYPE = {} AND TARGET_RESOURCE_ID = {}",
        quote_text(target_type),
        quote_text(target_id)
    );
    if let Some(expression) = expression {
        sql.push_str(&format!(" AND SOURCE_EXPRESSION = {}", quote_text(expression)));
    }
    if let Some(source_type) = source_type {
        sql.push_str(&format!(
            " AND SOURCE_RESOURCE_TYPE = {}",
            quote_text(source_type)
        ));
    }
    let rows = adapter.query(&sql).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            Some((
                row.text("SOURCE_RESOURCE_TYPE")?.to_string(),
                row.text("SOURCE_RESOURCE_ID")?.to_string(),
            ))
        })
        .collect())
}
