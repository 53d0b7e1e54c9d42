//! Search-parameter catalog.
//!
//! The catalog lives in the `SEARCH_PARAM_RES_EXPRESSIONS` table. Standard
//! rows are bulk-loaded from the bundled CSV at bootstrap; custom rows are a
//! side-effect of persisting `SearchParameter` resources and disappear when
//! those resources are deleted. The write path reads the catalog on every
//! mutation to discover which expressions to evaluate.

use serde_json::Value;

use crate::adapter::SqlAdapter;
use crate::error::{StoreError, StoreResult};
use crate::naming::quote_text;
use crate::schema::CATALOG_TABLE;

/// The six supported search parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Token,
    Number,
    Date,
    Reference,
    Uri,
}

impl ParamType {
    /// The FHIR code for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Token => "token",
            ParamType::Number => "number",
            ParamType::Date => "date",
            ParamType::Reference => "reference",
            ParamType::Uri => "uri",
        }
    }

    /// Parses a FHIR search parameter type code.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "string" => Some(ParamType::String),
            "token" => Some(ParamType::Token),
            "number" => Some(ParamType::Number),
            "date" => Some(ParamType::Date),
            "reference" => Some(ParamType::Reference),
            "uri" => Some(ParamType::Uri),
            _ => None,
        }
    }
}

/// One catalog row.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub param_type: ParamType,
    pub resource: String,
    pub expression: String,
    pub is_custom: bool,
}

fn entry_from_record(record: &crate::adapter::Record) -> Option<CatalogEntry> {
    let name = record.text("SEARCH_PARAM_NAME")?.to_string();
    let param_type = ParamType::parse(record.text("SEARCH_PARAM_TYPE")?)?;
    let resource = record.text("RESOURCE_NAME")?.to_string();
    let expression = record.text("EXPRESSION")?.to_string();
    let is_custom = record.int("IS_CUSTOM").unwrap_or(0) != 0;
    Some(CatalogEntry {
        name,
        param_type,
        resource,
        expression,
        is_custom,
    })
}

/// All catalog rows for a resource type, ordered by name.
pub async fn params_for(adapter: &SqlAdapter, resource_type: &str) -> StoreResult<Vec<CatalogEntry>> {
    let sql = format!(
        "SELECT SEARCH_PARAM_NAME, SEARCH_PARAM_TYPE, RESOURCE_NAME, EXPRESSION, IS_CUSTOM \
         FROM {CATALOG_TABLE} WHERE RESOURCE_NAME = {} ORDER BY SEARCH_PARAM_NAME",
        quote_text(resource_type)
    );
    let rows = adapter.query(&sql).await?;
    Ok(rows.iter().filter_map(entry_from_record).collect())
}

/// Looks up a single `(resource type, parameter name)` row.
pub async fn find(
    adapter: &SqlAdapter,
    resource_type: &str,
    name: &str,
) -> StoreResult<Option<CatalogEntry>> {
    let sql = format!(
        "SELECT SEARCH_PARAM_NAME, SEARCH_PARAM_TYPE, RESOURCE_NAME, EXPRESSION, IS_CUSTOM \
         FROM {CATALOG_TABLE} WHERE RESOURCE_NAME = {} AND SEARCH_PARAM_NAME = {}",
        quote_text(resource_type),
        quote_text(name)
    );
    let row = adapter.query_opt(&sql).await?;
    Ok(row.as_ref().and_then(entry_from_record))
}

/// Seeds the standard rows from the bundled CSV when the catalog is empty.
pub async fn seed_standard(adapter: &SqlAdapter) -> StoreResult<()> {
    let existing = adapter
        .query_opt(&format!(
            "SELECT COUNT(*) AS CNT FROM {CATALOG_TABLE} WHERE IS_CUSTOM = FALSE"
        ))
        .await?
        .and_then(|row| row.int("CNT"))
        .unwrap_or(0);
    if existing > 0 {
        return Ok(());
    }

    let mut reader = csv::Reader::from_reader(crate::schema::SEARCH_PARAMS_CSV.as_bytes());
    let mut seeded = 0usize;
    for result in reader.records() {
        let record = result.map_err(|e| StoreError::Internal {
            message: format!("malformed search-parameter seed: {e}"),
            source: Some(Box::new(e)),
        })?;
        let (name, resource, type_code, expression) = match (
            record.get(0),
            record.get(1),
            record.get(2),
            record.get(3),
        ) {
            (Some(n), Some(r), Some(t), Some(e)) => (n, r, t, e),
            _ => continue,
        };
        if ParamType::parse(type_code).is_none() {
            tracing::warn!(name, type_code, "skipping seed row with unknown type");
            continue;
        }
        let sql = format!(
            "INSERT INTO {CATALOG_TABLE} \
             (SEARCH_PARAM_NAME, SEARCH_PARAM_TYPE, RESOURCE_NAME, EXPRESSION, IS_CUSTOM) \
             VALUES ({}, {}, {}, {}, FALSE)",
            quote_text(name),
            quote_text(type_code),
            quote_text(resource),
            quote_text(expression)
        );
        adapter.execute(&sql).await?;
        seeded += 1;
    }
    tracing::info!(seeded, "seeded standard search parameters");
    Ok(())
}

/// The `(code, type, expression, base[])` tuple of a `SearchParameter` resource.
fn custom_definition(resource: &Value) -> StoreResult<(String, String, String, Vec<String>)> {
    let code = resource
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::invalid("SearchParameter is missing 'code'"))?;
    let type_code = resource
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::invalid("SearchParameter is missing 'type'"))?;
    if ParamType::parse(type_code).is_none() {
        return Err(StoreError::invalid(format!(
            "unsupported SearchParameter type '{type_code}'"
        )));
    }
    let expression = resource
        .get("expression")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::invalid("SearchParameter is missing 'expression'"))?;
    let base: Vec<String> = resource
        .get("base")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    if base.is_empty() {
        return Err(StoreError::invalid("SearchParameter is missing 'base'"));
    }
    Ok((
        code.to_string(),
        type_code.to_string(),
        expression.to_string(),
        base,
    ))
}

/// Upserts one custom catalog row per `base` entry of a `SearchParameter`.
pub async fn upsert_custom(adapter: &SqlAdapter, resource: &Value) -> StoreResult<()> {
    let (code, type_code, expression, base) = custom_definition(resource)?;
    for resource_name in &base {
        adapter
            .execute(&format!(
                "DELETE FROM {CATALOG_TABLE} WHERE RESOURCE_NAME = {} \
                 AND SEARCH_PARAM_NAME = {} AND IS_CUSTOM = TRUE",
                quote_text(resource_name),
                quote_text(&code)
            ))
            .await?;
        adapter
            .execute(&format!(
                "INSERT INTO {CATALOG_TABLE} \
                 (SEARCH_PARAM_NAME, SEARCH_PARAM_TYPE, RESOURCE_NAME, EXPRESSION, IS_CUSTOM) \
                 VALUES ({}, {}, {}, {}, TRUE)",
                quote_text(&code),
                quote_text(&type_code),
                quote_text(resource_name),
                quote_text(&expression)
            ))
            .await?;
        tracing::debug!(code, resource = %resource_name, "registered custom search parameter");
    }
    Ok(())
}

/// Removes the custom catalog rows declared by a `SearchParameter` resource.
pub async fn remove_custom(adapter: &SqlAdapter, resource: &Value) -> StoreResult<()> {
    let Some(code) = resource.get("code").and_then(Value::as_str) else {
        return Ok(());
    };
    match resource.get("base").and_then(Value::as_array) {
        Some(base) => {
            for resource_name in base.iter().filter_map(Value::as_str) {
                adapter
                    .execute(&format!(
                        "DELETE FROM {CATALOG_TABLE} WHERE RESOURCE_NAME = {} \
                         AND SEARCH_PARAM_NAME = {} AND IS_CUSTOM = TRUE",
                        quote_text(resource_name),
                        quote_text(code)
                    ))
                    .await?;
            }
        }
        None => {
            adapter
                .execute(&format!(
                    "DELETE FROM {CATALOG_TABLE} WHERE SEARCH_PARAM_NAME = {} \
                     AND IS_CUSTOM = TRUE",
                    quote_text(code)
                ))
                .await?;
        }
    }
    Ok(())
}
