//! Single-resource reads.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::adapter::{Record, SqlAdapter};
use crate::error::{StoreError, StoreResult};
use crate::naming::{self, quote_text};

/// Overwrites `meta.versionId` and `meta.lastUpdated` from the stored
/// columns. The blob's own meta is never authoritative.
pub fn overwrite_meta(resource: &mut Value, version: i64, last_updated: &DateTime<Utc>) {
    if let Some(obj) = resource.as_object_mut() {
        let meta = obj
            .entry("meta".to_string())
            .or_insert_with(|| json!({}));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("versionId".to_string(), json!(version.to_string()));
            meta.insert(
                "lastUpdated".to_string(),
                json!(naming::format_instant(last_updated)),
            );
        }
    }
}

/// Rehydrates a resource document from its table row.
pub fn resource_from_record(record: &Record) -> StoreResult<(Value, i64, DateTime<Utc>)> {
    let version = record
        .int("VERSION_ID")
        .ok_or_else(|| StoreError::internal("resource row without VERSION_ID"))?;
    let last_updated = record
        .text("LAST_UPDATED")
        .and_then(naming::parse_db_timestamp)
        .unwrap_or_else(Utc::now);
    let blob = record
        .bytes("RESOURCE_JSON")
        .ok_or_else(|| StoreError::internal("resource row without RESOURCE_JSON"))?;
    let mut resource: Value = serde_json::from_slice(blob)
        .map_err(|e| StoreError::internal(format!("corrupt resource blob: {e}")))?;
    overwrite_meta(&mut resource, version, &last_updated);
    Ok((resource, version, last_updated))
}

/// Fetches the full current row of an instance.
pub async fn fetch_row(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
) -> StoreResult<Option<Record>> {
    let table = naming::table_name(resource_type);
    let pk = naming::primary_key(resource_type);
    adapter
        .query_opt(&format!(
            "SELECT * FROM {table} WHERE {pk} = {}",
            quote_text(id)
        ))
        .await
}

/// Reads a resource, overwriting its meta from the stored columns.
pub async fn read(adapter: &SqlAdapter, resource_type: &str, id: &str) -> StoreResult<Value> {
    let record = fetch_row(adapter, resource_type, id)
        .await?
        .ok_or_else(|| StoreError::not_found(resource_type, id))?;
    let (resource, _, _) = resource_from_record(&record)?;
    Ok(resource)
}

/// True when the instance currently exists.
pub async fn exists(adapter: &SqlAdapter, resource_type: &str, id: &str) -> StoreResult<bool> {
    let table = naming::table_name(resource_type);
    let pk = naming::primary_key(resource_type);
    Ok(adapter
        .query_opt(&format!(
            "SELECT {pk} FROM {table} WHERE {pk} = {}",
            quote_text(id)
        ))
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_meta_creates_and_replaces() {
        let mut resource = json!({"resourceType": "Patient", "id": "p1"});
        let ts = Utc::now();
        overwrite_meta(&mut resource, 3, &ts);
        assert_eq!(resource["meta"]["versionId"], json!("3"));

        let mut tampered = json!({
            "resourceType": "Patient",
            "id": "p1",
            "meta": {"versionId": "999", "lastUpdated": "1970-01-01T00:00:00Z"}
        });
        overwrite_meta(&mut tampered, 1, &ts);
        assert_eq!(tampered["meta"]["versionId"], json!("1"));
        assert_ne!(tampered["meta"]["lastUpdated"], json!("1970-01-01T00:00:00Z"));
    }
}
