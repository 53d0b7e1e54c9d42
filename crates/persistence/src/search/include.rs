//! `_include` / `_revinclude` traversal over the reference graph.

use std::collections::HashSet;

use serde_json::Value;

use crate::adapter::SqlAdapter;
use crate::catalog::{self, ParamType};
use crate::error::{StoreError, StoreResult};
use crate::fhirpath;
use crate::read;
use crate::references;

/// A parsed `SourceType:searchParam[:TargetType]` directive, or `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub source_type: String,
    pub param: String,
    pub target_type: Option<String>,
    pub wildcard: bool,
}

/// Parses an include directive value.
pub fn parse_directive(value: &str) -> Option<IncludeDirective> {
    if value == "*" {
        return Some(IncludeDirective {
            source_type: String::new(),
            param: String::new(),
            target_type: None,
            wildcard: true,
        });
    }
    let mut parts = value.split(':');
    let source_type = parts.next()?.to_string();
    let param = parts.next()?.to_string();
    let target_type = parts.next().map(String::from);
    if parts.next().is_some() || source_type.is_empty() || param.is_empty() {
        return None;
    }
    Some(IncludeDirective {
        source_type,
        param,
        target_type,
        wildcard: false,
    })
}

/// Fetches a live resource, skipping targets that no longer exist.
async fn fetch_live(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
) -> StoreResult<Option<Value>> {
    match read::read(adapter, resource_type, id).await {
        Ok(resource) => Ok(Some(resource)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn push_unique(
    seen: &mut HashSet<String>,
    out: &mut Vec<Value>,
    resource_type: &str,
    id: &str,
    resource: Value,
) {
    if seen.insert(format!("{resource_type}/{id}")) {
        out.push(resource);
    }
}

/// Widens the result set along outgoing edges of the matched resources.
pub async fn apply_include(
    adapter: &SqlAdapter,
    searched_type: &str,
    matched_ids: &[String],
    directive: &IncludeDirective,
    seen: &mut HashSet<String>,
    out: &mut Vec<Value>,
) -> StoreResult<()> {
    if directive.wildcard {
        for id in matched_ids {
            for (target_type, target_id) in
                references::distinct_targets(adapter, searched_type, id, None, None).await?
            {
                if let Some(resource) = fetch_live(adapter, &target_type, &target_id).await? {
                    push_unique(seen, out, &target_type, &target_id, resource);
                }
            }
        }
        return Ok(());
    }

    if directive.source_type != searched_type {
        return Ok(());
    }
    let Some(entry) = catalog::find(adapter, &directive.source_type, &directive.param).await?
    else {
        return Ok(());
    };
    if entry.param_type != ParamType::Reference {
        return Ok(());
    }

    let leaf = fhirpath::leaf_field(&entry.expression);
    let pinned_target = fhirpath::where_resolve_target(&entry.expression)
        .or_else(|| directive.target_type.clone());

    for id in matched_ids {
        for (target_type, target_id) in references::distinct_targets(
            adapter,
            searched_type,
            id,
            Some(&leaf),
            pinned_target.as_deref(),
        )
        .await?
        {
            if let Some(resource) = fetch_live(adapter, &target_type, &target_id).await? {
                push_unique(seen, out, &target_type, &target_id, resource);
            }
        }
    }
    Ok(())
}

/// Widens the result set with resources that reference the matches.
pub async fn apply_revinclude(
    adapter: &SqlAdapter,
    searched_type: &str,
    matched_ids: &[String],
    directive: &IncludeDirective,
    seen: &mut HashSet<String>,
    out: &mut Vec<Value>,
) -> StoreResult<()> {
    if directive.wildcard {
        for id in matched_ids {
            for (source_type, source_id) in
                references::distinct_sources(adapter, searched_type, id, None, None).await?
            {
                if let Some(resource) = fetch_live(adapter, &source_type, &source_id).await? {
                    push_unique(seen, out, &source_type, &source_id, resource);
                }
            }
        }
        return Ok(());
    }

    let Some(entry) = catalog::find(adapter, &directive.source_type, &directive.param).await?
    else {
        return Ok(());
    };
    if entry.param_type != ParamType::Reference {
        return Ok(());
    }
    let leaf = fhirpath::leaf_field(&entry.expression);

    for id in matched_ids {
        for (source_type, source_id) in references::distinct_sources(
            adapter,
            searched_type,
            id,
            Some(&leaf),
            Some(&directive.source_type),
        )
        .await?
        {
            if let Some(resource) = fetch_live(adapter, &source_type, &source_id).await? {
                push_unique(seen, out, &source_type, &source_id, resource);
            }
        }
    }
    Ok(())
}
