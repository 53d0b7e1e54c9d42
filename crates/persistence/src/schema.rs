//! Bundled schema assets and bootstrap.
//!
//! The schema ships with the binary: one DDL file per backend plus the CSV
//! of standard search parameters. Bootstrap is idempotent; an optional clear
//! pass wipes all data and reseeds the catalog.

use crate::adapter::SqlAdapter;
use crate::catalog;
use crate::error::StoreResult;
use crate::naming::{self, Dialect};

/// DDL for the embedded backend.
pub const SQLITE_SCHEMA: &str = include_str!("../sql/schema-sqlite.sql");

/// DDL for the PostgreSQL backend.
pub const POSTGRES_SCHEMA: &str = include_str!("../sql/schema-postgres.sql");

/// Standard R4 search parameters, `(name, resource, type, expression)`.
pub const SEARCH_PARAMS_CSV: &str = include_str!("../data/search-params.csv");

/// The reference edge table. Quoted: `REFERENCES` is reserved in both dialects.
pub const REFERENCES_TABLE: &str = "\"REFERENCES\"";

/// The search-parameter catalog table.
pub const CATALOG_TABLE: &str = "SEARCH_PARAM_RES_EXPRESSIONS";

/// The EAV side table for custom-extension and token index rows.
pub const EXTENSION_INDEX_TABLE: &str = "CUSTOM_EXTENSION_SEARCH_PARAMS";

/// The append-only version history table.
pub const HISTORY_TABLE: &str = "RESOURCE_HISTORY";

/// Resource types the bundled DDL creates tables for. The engine itself is
/// schema-driven and serves any type whose table exists in the live database.
pub const RESOURCE_TYPES: &[&str] = &[
    "Appointment",
    "Encounter",
    "Medication",
    "Organization",
    "Patient",
    "Practitioner",
    "SearchParameter",
    "StructureDefinition",
];

/// Creates all tables and seeds the standard search-parameter catalog.
///
/// With `clear` set, all data is wiped first (startup truncate-and-reseed).
pub async fn bootstrap(adapter: &SqlAdapter, clear: bool) -> StoreResult<()> {
    let ddl = match adapter.dialect() {
        Dialect::Sqlite => SQLITE_SCHEMA,
        Dialect::Postgres => POSTGRES_SCHEMA,
    };
    adapter.execute_batch(ddl).await?;

    if clear {
        clear_all(adapter).await?;
    }
    catalog::seed_standard(adapter).await?;
    Ok(())
}

/// Clears every resource table plus the engine tables.
pub async fn clear_all(adapter: &SqlAdapter) -> StoreResult<()> {
    let mut tables: Vec<String> = RESOURCE_TYPES
        .iter()
        .map(|t| naming::table_name(t))
        .collect();
    tables.push(REFERENCES_TABLE.to_string());
    tables.push(CATALOG_TABLE.to_string());
    tables.push(EXTENSION_INDEX_TABLE.to_string());
    tables.push(HISTORY_TABLE.to_string());
    adapter.clear_tables(&tables).await
}
