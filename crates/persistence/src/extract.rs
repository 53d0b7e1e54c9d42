//! Search-parameter value extraction.
//!
//! For every catalog row of the written resource's type, the extractor
//! evaluates the row's expression and converts the results into indexable
//! values. Standard parameters land in the resource table's typed columns;
//! custom parameters and all token-typed values land in the
//! `CUSTOM_EXTENSION_SEARCH_PARAMS` side table; every extracted reference
//! becomes a pending edge for the reference graph. A parameter that fails to
//! extract is logged and skipped, never fatal; the resource remains
//! discoverable by everything that did extract.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::adapter::SqlAdapter;
use crate::catalog::{self, CatalogEntry, ParamType};
use crate::error::{StoreError, StoreResult};
use crate::fhirpath;
use crate::naming::{self, quote_text, SqlValue};
use crate::schema::EXTENSION_INDEX_TABLE;

/// A reference value awaiting insertion into the edge table.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdge {
    /// Leaf JSON field the reference was found under (e.g. `actor`).
    pub expression: String,
    pub target_type: String,
    pub target_id: String,
    pub display: Option<String>,
}

/// One row bound for the EAV side table.
#[derive(Debug, Clone, Default)]
pub struct IndexRow {
    pub param_name: String,
    pub param_type: &'static str,
    pub value_string: Option<String>,
    pub value_number: Option<f64>,
    pub value_date: Option<SqlValue>,
    pub token_system: Option<String>,
    pub token_code: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
}

/// The outcome of one extraction pass over a resource.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Typed column writes: uppercase column name to value.
    pub columns: BTreeMap<String, SqlValue>,
    /// Side-table rows (custom parameters, token values, `_profile`).
    pub index_rows: Vec<IndexRow>,
    /// Reference edges to write, deduplicated.
    pub edges: Vec<PendingEdge>,
}

impl Extraction {
    fn push_edge(&mut self, edge: PendingEdge) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }
}

/// A single converted value, before routing.
#[derive(Debug, Clone)]
enum Extracted {
    Str(String),
    Num(f64),
    Date(SqlValue),
    Token {
        system: Option<String>,
        code: String,
        raw: Value,
    },
    Ref {
        target_type: String,
        target_id: String,
        display: Option<String>,
    },
}

/// Runs the full extraction pass for a resource about to be written.
pub async fn extract(
    adapter: &SqlAdapter,
    resource_type: &str,
    resource: &Value,
) -> StoreResult<Extraction> {
    let params = catalog::params_for(adapter, resource_type).await?;
    let live_columns = adapter
        .table_columns(&naming::table_name(resource_type))
        .await?;

    let mut out = Extraction::default();
    for entry in &params {
        let values = match extract_param(resource, entry) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(
                    param = %entry.name,
                    resource_type,
                    error = %e,
                    "search parameter extraction failed"
                );
                continue;
            }
        };
        if values.is_empty() {
            continue;
        }
        route(entry, values, &live_columns, &mut out);
    }

    // meta.profile is indexed so _profile searches never scan blobs.
    for profile in fhirpath::evaluate(resource, "meta.profile") {
        if let Some(url) = profile.as_str() {
            out.index_rows.push(IndexRow {
                param_name: "_profile".to_string(),
                param_type: ParamType::Uri.as_str(),
                value_string: Some(url.to_string()),
                ..Default::default()
            });
        }
    }

    Ok(out)
}

/// Extracts and converts the values of one catalog parameter.
fn extract_param(resource: &Value, entry: &CatalogEntry) -> StoreResult<Vec<Extracted>> {
    let raw_values = if entry.expression.contains(".where(url='") {
        extension_values(resource, &entry.expression)?
    } else if entry.expression.contains(".where(") {
        // resolve()-style clauses only pin the include target type; the
        // value set is the stripped path.
        let stripped = fhirpath::strip_where(&entry.expression);
        fhirpath::evaluate(resource, &stripped)
    } else {
        fhirpath::evaluate(resource, &entry.expression)
    };

    let mut converted = Vec::new();
    for value in &raw_values {
        converted.extend(convert(value, entry.param_type)?);
    }
    Ok(converted)
}

/// The custom-extension path: a literal `where(url='…')` filter over the
/// resource's top-level `extension` array.
fn extension_values(resource: &Value, expression: &str) -> StoreResult<Vec<Value>> {
    let url = fhirpath::where_url(expression)
        .ok_or_else(|| StoreError::format(format!("unparseable extension filter: {expression}")))?;

    // The segment after the where() clause names the value element, when present.
    let value_key = {
        let leaf = fhirpath::leaf_field(&fhirpath::strip_where(expression));
        if leaf.starts_with("value") {
            Some(leaf)
        } else {
            None
        }
    };

    let Some(extensions) = resource.get("extension").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for ext in extensions {
        if ext.get("url").and_then(Value::as_str) != Some(url.as_str()) {
            continue;
        }
        let value = match &value_key {
            Some(key) => ext.get(key),
            None => ext
                .as_object()
                .and_then(|obj| obj.iter().find(|(k, _)| k.starts_with("value")))
                .map(|(_, v)| v),
        };
        if let Some(value) = value {
            out.push(value.clone());
        }
    }
    Ok(out)
}

/// Converts one extracted JSON value per the parameter type contract.
fn convert(value: &Value, param_type: ParamType) -> StoreResult<Vec<Extracted>> {
    match param_type {
        ParamType::String => Ok(vec![Extracted::Str(stringify(value))]),
        ParamType::Uri => match value {
            Value::String(s) => Ok(vec![Extracted::Str(s.clone())]),
            other => Err(StoreError::format(format!(
                "uri parameter expects a string, got {other}"
            ))),
        },
        ParamType::Number => match value.as_f64() {
            Some(n) => Ok(vec![Extracted::Num(n)]),
            None => Err(StoreError::format(format!(
                "number parameter expects int or decimal, got {value}"
            ))),
        },
        ParamType::Date => match value {
            Value::String(s) => Ok(vec![Extracted::Date(naming::parse_partial_date(s)?)]),
            other => Err(StoreError::format(format!(
                "date parameter expects a string, got {other}"
            ))),
        },
        ParamType::Token => convert_token(value),
        ParamType::Reference => convert_reference(value).map(|r| vec![r]),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Token conversion with a depth-1 peek: plain scalars, Coding, Identifier,
/// and CodeableConcept all yield `(system, code)` pairs.
fn convert_token(value: &Value) -> StoreResult<Vec<Extracted>> {
    match value {
        Value::String(s) => Ok(vec![Extracted::Token {
            system: None,
            code: s.clone(),
            raw: value.clone(),
        }]),
        Value::Bool(b) => Ok(vec![Extracted::Token {
            system: None,
            code: b.to_string(),
            raw: value.clone(),
        }]),
        Value::Number(n) => Ok(vec![Extracted::Token {
            system: None,
            code: n.to_string(),
            raw: value.clone(),
        }]),
        Value::Object(obj) => {
            let system = obj.get("system").and_then(Value::as_str).map(String::from);
            if let Some(code) = obj.get("code").and_then(Value::as_str) {
                return Ok(vec![Extracted::Token {
                    system,
                    code: code.to_string(),
                    raw: value.clone(),
                }]);
            }
            if let Some(id_value) = obj.get("value").and_then(Value::as_str) {
                return Ok(vec![Extracted::Token {
                    system,
                    code: id_value.to_string(),
                    raw: value.clone(),
                }]);
            }
            if let Some(codings) = obj.get("coding").and_then(Value::as_array) {
                let mut out = Vec::new();
                for coding in codings {
                    if let Some(code) = coding.get("code").and_then(Value::as_str) {
                        out.push(Extracted::Token {
                            system: coding
                                .get("system")
                                .and_then(Value::as_str)
                                .map(String::from),
                            code: code.to_string(),
                            raw: value.clone(),
                        });
                    }
                }
                return Ok(out);
            }
            Err(StoreError::format(format!(
                "token parameter expects a scalar, Coding, Identifier or CodeableConcept, got {value}"
            )))
        }
        other => Err(StoreError::format(format!(
            "token parameter cannot index {other}"
        ))),
    }
}

fn convert_reference(value: &Value) -> StoreResult<Extracted> {
    match value {
        Value::String(s) => {
            let (target_type, target_id) = parse_relative_reference(s)
                .ok_or_else(|| StoreError::format(format!("malformed reference '{s}'")))?;
            Ok(Extracted::Ref {
                target_type,
                target_id,
                display: None,
            })
        }
        Value::Object(obj) => {
            let reference = obj
                .get("reference")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::format(format!("reference without target: {value}")))?;
            let (target_type, target_id) = parse_relative_reference(reference).ok_or_else(|| {
                StoreError::format(format!("malformed reference '{reference}'"))
            })?;
            Ok(Extracted::Ref {
                target_type,
                target_id,
                display: obj.get("display").and_then(Value::as_str).map(String::from),
            })
        }
        other => Err(StoreError::format(format!(
            "reference parameter cannot index {other}"
        ))),
    }
}

/// Parses a relative `Type/id` reference. Absolute URLs and fragments are not
/// edge material.
pub fn parse_relative_reference(reference: &str) -> Option<(String, String)> {
    if reference.contains("://") || reference.starts_with('#') {
        return None;
    }
    let mut parts = reference.split('/');
    let target_type = parts.next()?;
    let target_id = parts.next()?;
    if parts.next().is_some() || target_type.is_empty() || target_id.is_empty() {
        return None;
    }
    if !target_type.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some((target_type.to_string(), target_id.to_string()))
}

/// Routes converted values to columns, index rows, and pending edges.
fn route(
    entry: &CatalogEntry,
    values: Vec<Extracted>,
    live_columns: &[String],
    out: &mut Extraction,
) {
    let column = naming::column_name(&entry.name);
    let column_is_live = live_columns.iter().any(|c| c == &column);

    if entry.is_custom {
        for value in &values {
            out.index_rows.push(index_row(entry, value));
        }
    } else {
        if column_is_live {
            if let Some(cell) = column_value(entry.param_type, &values) {
                out.columns.insert(column, cell);
            }
        }
        // Token values always land in the side table; that is where token
        // search resolves, the typed column only keeps a convenience copy.
        if entry.param_type == ParamType::Token {
            for value in &values {
                out.index_rows.push(index_row(entry, value));
            }
        }
    }

    if entry.param_type == ParamType::Reference {
        let leaf = fhirpath::leaf_field(&entry.expression);
        for value in &values {
            if let Extracted::Ref {
                target_type,
                target_id,
                display,
            } = value
            {
                out.push_edge(PendingEdge {
                    expression: leaf.clone(),
                    target_type: target_type.clone(),
                    target_id: target_id.clone(),
                    display: display.clone(),
                });
            }
        }
    }
}

/// Collapses a value list into one typed column cell.
fn column_value(param_type: ParamType, values: &[Extracted]) -> Option<SqlValue> {
    match param_type {
        ParamType::String | ParamType::Uri => {
            let joined = values
                .iter()
                .filter_map(|v| match v {
                    Extracted::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            if joined.is_empty() {
                None
            } else {
                Some(SqlValue::Text(joined))
            }
        }
        ParamType::Number => values.iter().find_map(|v| match v {
            Extracted::Num(n) => Some(SqlValue::Number(*n)),
            _ => None,
        }),
        ParamType::Date => values.iter().find_map(|v| match v {
            Extracted::Date(d) => Some(d.clone()),
            _ => None,
        }),
        ParamType::Token => values.iter().find_map(|v| match v {
            Extracted::Token { raw, .. } => Some(SqlValue::Text(raw.to_string())),
            _ => None,
        }),
        ParamType::Reference => values.iter().find_map(|v| match v {
            Extracted::Ref {
                target_type,
                target_id,
                ..
            } => Some(SqlValue::Text(format!("{target_type}/{target_id}"))),
            _ => None,
        }),
    }
}

fn index_row(entry: &CatalogEntry, value: &Extracted) -> IndexRow {
    let mut row = IndexRow {
        param_name: entry.name.clone(),
        param_type: entry.param_type.as_str(),
        ..Default::default()
    };
    match value {
        Extracted::Str(s) => row.value_string = Some(s.clone()),
        Extracted::Num(n) => row.value_number = Some(*n),
        Extracted::Date(d) => row.value_date = Some(d.clone()),
        Extracted::Token { system, code, .. } => {
            row.token_system = system.clone();
            row.token_code = Some(code.clone());
        }
        Extracted::Ref {
            target_type,
            target_id,
            ..
        } => {
            row.reference_type = Some(target_type.clone());
            row.reference_id = Some(target_id.clone());
        }
    }
    row
}

/// Deletes a resource's side-table rows.
pub async fn delete_index_rows(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
) -> StoreResult<u64> {
    adapter
        .execute(&format!(
            "DELETE FROM {EXTENSION_INDEX_TABLE} WHERE RESOURCE_TYPE = {} AND RESOURCE_ID = {}",
            quote_text(resource_type),
            quote_text(id)
        ))
        .await
}

/// Rewrites a resource's side-table rows: delete everything, insert afresh.
pub async fn rewrite_index_rows(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    rows: &[IndexRow],
) -> StoreResult<()> {
    delete_index_rows(adapter, resource_type, id).await?;

    let dialect = adapter.dialect();
    for row in rows {
        let opt_text = |v: &Option<String>| match v {
            Some(s) => quote_text(s),
            None => "NULL".to_string(),
        };
        let value_number = match row.value_number {
            Some(n) => SqlValue::Number(n).to_literal(dialect)?,
            None => "NULL".to_string(),
        };
        let value_date = match &row.value_date {
            Some(d) => d.to_literal(dialect)?,
            None => "NULL".to_string(),
        };
        let sql = format!(
            "INSERT INTO {EXTENSION_INDEX_TABLE} \
             (RESOURCE_TYPE, RESOURCE_ID, PARAM_NAME, PARAM_TYPE, VALUE_STRING, VALUE_NUMBER, \
              VALUE_DATE, VALUE_TOKEN_SYSTEM, VALUE_TOKEN_CODE, VALUE_REFERENCE_TYPE, \
              VALUE_REFERENCE_ID) \
             VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            quote_text(resource_type),
            quote_text(id),
            quote_text(&row.param_name),
            quote_text(row.param_type),
            opt_text(&row.value_string),
            value_number,
            value_date,
            opt_text(&row.token_system),
            opt_text(&row.token_code),
            opt_text(&row.reference_type),
            opt_text(&row.reference_id),
        );
        adapter.execute(&sql).await?;
    }
    Ok(())
}
