//! FHIR Bundle assembly.

use serde_json::{json, Value};
use vireo_persistence::{HistoryEntry, SearchOutcome};

use crate::routes::BASE_PATH;

fn full_url(base_url: &str, resource: &Value) -> Option<String> {
    let resource_type = resource.get("resourceType")?.as_str()?;
    let id = resource.get("id")?.as_str()?;
    Some(format!("{base_url}{BASE_PATH}/{resource_type}/{id}"))
}

fn searchset_entry(base_url: &str, resource: &Value, mode: &str) -> Value {
    let mut entry = json!({
        "resource": resource,
        "search": {"mode": mode}
    });
    if let Some(url) = full_url(base_url, resource) {
        entry["fullUrl"] = json!(url);
    }
    entry
}

/// Wraps a search outcome into a `searchset` Bundle. Matches come first,
/// include/revinclude resources after, each tagged with its search mode.
pub fn searchset_bundle(base_url: &str, outcome: &SearchOutcome) -> Value {
    let mut entries: Vec<Value> = outcome
        .matches
        .iter()
        .map(|resource| searchset_entry(base_url, resource, "match"))
        .collect();
    entries.extend(
        outcome
            .included
            .iter()
            .map(|resource| searchset_entry(base_url, resource, "include")),
    );
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": outcome.total,
        "entry": entries
    })
}

/// Wraps an instance history into a `history` Bundle, newest first.
pub fn history_bundle(
    base_url: &str,
    resource_type: &str,
    id: &str,
    entries: &[HistoryEntry],
) -> Value {
    let bundle_entries: Vec<Value> = entries
        .iter()
        .map(|entry| {
            json!({
                "fullUrl": format!("{base_url}{BASE_PATH}/{resource_type}/{id}"),
                "resource": entry.resource,
                "request": {
                    "method": entry.operation,
                    "url": format!("{resource_type}/{id}")
                }
            })
        })
        .collect();
    json!({
        "resourceType": "Bundle",
        "type": "history",
        "total": entries.len(),
        "entry": bundle_entries
    })
}
