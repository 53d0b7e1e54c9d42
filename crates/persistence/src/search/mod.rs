//! Bundle-producing search.
//!
//! Query parameters are classified into control parameters, reference
//! lookups (resolved against the edge table), token and custom lookups
//! (resolved against the EAV side table), and typed-column predicates
//! compiled into the WHERE clause. Reference and side-table lookups produce
//! id sets that intersect with each other and with the column predicates.

mod include;
mod params;

pub use include::{parse_directive, IncludeDirective};
pub use params::{parse_token, Prefix, SystemFilter, TokenQuery, CONTROL_WHITELIST};

use std::collections::HashSet;

use serde_json::Value;

use crate::adapter::SqlAdapter;
use crate::catalog::{self, CatalogEntry, ParamType};
use crate::error::{StoreError, StoreResult};
use crate::extract::parse_relative_reference;
use crate::naming::{self, quote_text};
use crate::read;
use crate::references;
use crate::schema::EXTENSION_INDEX_TABLE;

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Raw query parameters, in request order.
    pub params: Vec<(String, String)>,
    /// 1-based page number.
    pub page: u32,
    /// Page size; `_count` overrides it.
    pub count: u32,
}

impl SearchRequest {
    pub fn new(params: Vec<(String, String)>) -> Self {
        Self {
            params,
            page: 1,
            count: 20,
        }
    }
}

/// The result of a search, before Bundle assembly.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub total: i64,
    pub matches: Vec<Value>,
    pub included: Vec<Value>,
}

/// Progressive id-set intersection; `None` means unconstrained.
fn intersect(acc: &mut Option<HashSet<String>>, ids: HashSet<String>) {
    match acc {
        None => *acc = Some(ids),
        Some(existing) => existing.retain(|id| ids.contains(id)),
    }
}

/// Runs a search over one resource type.
pub async fn search(
    adapter: &SqlAdapter,
    resource_type: &str,
    request: &SearchRequest,
) -> StoreResult<SearchOutcome> {
    let table = naming::table_name(resource_type);
    let pk = naming::primary_key(resource_type);
    let live_columns = adapter.table_columns(&table).await?;
    if live_columns.is_empty() {
        return Err(StoreError::invalid(format!(
            "unsupported resource type '{resource_type}'"
        )));
    }

    let mut predicates: Vec<String> = Vec::new();
    let mut id_filter: Option<HashSet<String>> = None;
    let mut includes: Vec<IncludeDirective> = Vec::new();
    let mut revincludes: Vec<IncludeDirective> = Vec::new();
    let mut count = request.count;

    for (name, value) in &request.params {
        if name.starts_with('_') {
            match name.as_str() {
                "_id" => predicates.push(format!("{pk} = {}", quote_text(value))),
                "_lastUpdated" => {
                    let (prefix, remainder) = Prefix::split(value);
                    let literal =
                        naming::parse_partial_date(remainder)?.to_literal(adapter.dialect())?;
                    predicates.push(format!("LAST_UPDATED {} {literal}", prefix.op()));
                }
                "_profile" => {
                    let ids = index_lookup(
                        adapter,
                        resource_type,
                        "_profile",
                        &format!("VALUE_STRING = {}", quote_text(value)),
                    )
                    .await?;
                    intersect(&mut id_filter, ids);
                }
                "_include" => {
                    if let Some(directive) = parse_directive(value) {
                        includes.push(directive);
                    }
                }
                "_revinclude" => {
                    if let Some(directive) = parse_directive(value) {
                        revincludes.push(directive);
                    }
                }
                "_count" => {
                    count = value.parse().map_err(|_| {
                        StoreError::invalid(format!("invalid _count value '{value}'"))
                    })?;
                }
                other => {
                    return Err(StoreError::UnsupportedParameter {
                        parameter: other.to_string(),
                    });
                }
            }
            continue;
        }

        match catalog::find(adapter, resource_type, name).await? {
            None => {
                tracing::debug!(param = %name, resource_type, "unknown search parameter skipped");
            }
            Some(entry) if entry.is_custom => {
                let ids = custom_lookup(adapter, resource_type, &entry, value).await?;
                intersect(&mut id_filter, ids);
            }
            Some(entry) => match entry.param_type {
                ParamType::Reference => {
                    if value.contains('/') && !value.contains('|') {
                        let (target_type, target_id) = parse_relative_reference(value)
                            .ok_or_else(|| {
                                StoreError::invalid(format!("malformed reference query '{value}'"))
                            })?;
                        let ids: HashSet<String> = references::sources_referencing(
                            adapter,
                            resource_type,
                            &target_type,
                            &target_id,
                        )
                        .await?
                        .into_iter()
                        .collect();
                        intersect(&mut id_filter, ids);
                    } else if let Some(column) = live_column(&live_columns, &entry.name) {
                        // A bare logical id matches only as the trailing id
                        // segment of the stored `Type/id`, never mid-string.
                        predicates.push(format!(
                            "({column} = {} OR {column} LIKE {})",
                            quote_text(value),
                            quote_text(&format!("%/{value}"))
                        ));
                    }
                }
                ParamType::Token => {
                    let ids = index_lookup(
                        adapter,
                        resource_type,
                        &entry.name,
                        &token_predicate(&parse_token(value)),
                    )
                    .await?;
                    intersect(&mut id_filter, ids);
                }
                ParamType::Date => {
                    if let Some(column) = live_column(&live_columns, &entry.name) {
                        let (prefix, remainder) = Prefix::split(value);
                        let literal = naming::parse_partial_date(remainder)?
                            .to_literal(adapter.dialect())?;
                        predicates.push(format!("{column} {} {literal}", prefix.op()));
                    }
                }
                ParamType::Number => {
                    if let Some(column) = live_column(&live_columns, &entry.name) {
                        let (prefix, remainder) = Prefix::split(value);
                        let number: f64 = remainder.parse().map_err(|_| {
                            StoreError::format(format!("invalid number value '{value}'"))
                        })?;
                        predicates.push(format!("{column} {} {number}", prefix.op()));
                    }
                }
                ParamType::Uri => {
                    if let Some(column) = live_column(&live_columns, &entry.name) {
                        predicates.push(format!("{column} = {}", quote_text(value)));
                    }
                }
                ParamType::String => {
                    if let Some(column) = live_column(&live_columns, &entry.name) {
                        predicates.push(like_predicate(&column, value));
                    }
                }
            },
        }
    }

    // An exhausted id intersection means no matches, full stop.
    if matches!(&id_filter, Some(ids) if ids.is_empty()) {
        return Ok(SearchOutcome::default());
    }
    if let Some(ids) = &id_filter {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        let list = sorted
            .iter()
            .map(|id| quote_text(id))
            .collect::<Vec<_>>()
            .join(", ");
        predicates.push(format!("{pk} IN ({list})"));
    }

    let where_clause = if predicates.is_empty() {
        "1 = 1".to_string()
    } else {
        predicates.join(" AND ")
    };

    let total = adapter
        .query_opt(&format!(
            "SELECT COUNT(*) AS CNT FROM {table} WHERE {where_clause}"
        ))
        .await?
        .and_then(|row| row.int("CNT"))
        .unwrap_or(0);

    let mut outcome = SearchOutcome {
        total,
        ..Default::default()
    };
    if count == 0 {
        return Ok(outcome);
    }

    let offset = (request.page.max(1) - 1) as i64 * count as i64;
    let rows = adapter
        .query(&format!(
            "SELECT * FROM {table} WHERE {where_clause} ORDER BY {pk} LIMIT {count} OFFSET {offset}"
        ))
        .await?;

    let mut matched_ids = Vec::new();
    for row in &rows {
        let (resource, _, _) = read::resource_from_record(row)?;
        if let Some(id) = row.text(&pk) {
            matched_ids.push(id.to_string());
        }
        outcome.matches.push(resource);
    }

    let mut seen: HashSet<String> = matched_ids
        .iter()
        .map(|id| format!("{resource_type}/{id}"))
        .collect();
    for directive in &includes {
        include::apply_include(
            adapter,
            resource_type,
            &matched_ids,
            directive,
            &mut seen,
            &mut outcome.included,
        )
        .await?;
    }
    for directive in &revincludes {
        include::apply_revinclude(
            adapter,
            resource_type,
            &matched_ids,
            directive,
            &mut seen,
            &mut outcome.included,
        )
        .await?;
    }

    Ok(outcome)
}

fn live_column(live_columns: &[String], param: &str) -> Option<String> {
    let column = naming::column_name(param);
    live_columns.iter().any(|c| *c == column).then_some(column)
}

fn like_predicate(column: &str, value: &str) -> String {
    format!("{column} LIKE {}", quote_text(&format!("%{value}%")))
}

/// The side-table predicate for one parsed token query.
fn token_predicate(token: &TokenQuery) -> String {
    let mut parts = Vec::new();
    match &token.system {
        SystemFilter::Any => {}
        SystemFilter::Missing => parts.push("VALUE_TOKEN_SYSTEM IS NULL".to_string()),
        SystemFilter::Is(system) => {
            parts.push(format!("VALUE_TOKEN_SYSTEM = {}", quote_text(system)))
        }
    }
    if let Some(code) = &token.code {
        parts.push(format!("VALUE_TOKEN_CODE = {}", quote_text(code)));
    }
    if parts.is_empty() {
        "1 = 1".to_string()
    } else {
        parts.join(" AND ")
    }
}

/// Distinct resource ids matching a side-table predicate for one parameter.
async fn index_lookup(
    adapter: &SqlAdapter,
    resource_type: &str,
    param_name: &str,
    predicate: &str,
) -> StoreResult<HashSet<String>> {
    let rows = adapter
        .query(&format!(
            "SELECT DISTINCT RESOURCE_ID FROM {EXTENSION_INDEX_TABLE} \
             WHERE RESOURCE_TYPE = {} AND PARAM_NAME = {} AND {predicate}",
            quote_text(resource_type),
            quote_text(param_name)
        ))
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.text("RESOURCE_ID").map(String::from))
        .collect())
}

/// Type-specific side-table predicates for custom parameters.
async fn custom_lookup(
    adapter: &SqlAdapter,
    resource_type: &str,
    entry: &CatalogEntry,
    value: &str,
) -> StoreResult<HashSet<String>> {
    let dialect = adapter.dialect();
    let predicate = match entry.param_type {
        ParamType::String => format!(
            "VALUE_STRING LIKE {}",
            quote_text(&format!("%{value}%"))
        ),
        ParamType::Uri => format!("VALUE_STRING = {}", quote_text(value)),
        ParamType::Token => token_predicate(&parse_token(value)),
        ParamType::Number => {
            let (prefix, remainder) = Prefix::split(value);
            let number: f64 = remainder
                .parse()
                .map_err(|_| StoreError::format(format!("invalid number value '{value}'")))?;
            format!("VALUE_NUMBER {} {number}", prefix.op())
        }
        ParamType::Date => {
            let (prefix, remainder) = Prefix::split(value);
            let literal = naming::parse_partial_date(remainder)?.to_literal(dialect)?;
            format!("VALUE_DATE {} {literal}", prefix.op())
        }
        ParamType::Reference => match parse_relative_reference(value) {
            Some((target_type, target_id)) => format!(
                "VALUE_REFERENCE_TYPE = {} AND VALUE_REFERENCE_ID = {}",
                quote_text(&target_type),
                quote_text(&target_id)
            ),
            None => format!("VALUE_REFERENCE_ID = {}", quote_text(value)),
        },
    };
    index_lookup(adapter, resource_type, &entry.name, &predicate).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_narrows() {
        let mut acc = None;
        intersect(&mut acc, ["a", "b", "c"].iter().map(|s| s.to_string()).collect());
        intersect(&mut acc, ["b", "c", "d"].iter().map(|s| s.to_string()).collect());
        let ids = acc.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("b") && ids.contains("c"));
    }

    #[test]
    fn token_predicates_cover_the_four_forms() {
        assert_eq!(
            token_predicate(&parse_token("male")),
            "VALUE_TOKEN_CODE = 'male'"
        );
        assert_eq!(
            token_predicate(&parse_token("s|c")),
            "VALUE_TOKEN_SYSTEM = 's' AND VALUE_TOKEN_CODE = 'c'"
        );
        assert_eq!(
            token_predicate(&parse_token("|c")),
            "VALUE_TOKEN_SYSTEM IS NULL AND VALUE_TOKEN_CODE = 'c'"
        );
        assert_eq!(
            token_predicate(&parse_token("s|")),
            "VALUE_TOKEN_SYSTEM = 's'"
        );
    }

    #[test]
    fn like_predicate_escapes_quotes() {
        assert_eq!(
            like_predicate("NAME", "O'Brien"),
            "NAME LIKE '%O''Brien%'"
        );
    }
}
