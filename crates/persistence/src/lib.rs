//! Vireo FHIR Server storage engine.
//!
//! A relational schema doubles as document store and search index: each
//! resource type owns a `<Type>Table` holding the canonical JSON blob next
//! to typed search-parameter columns, a `"REFERENCES"` table carries the
//! cross-resource edge graph, `SEARCH_PARAM_RES_EXPRESSIONS` catalogs the
//! FHIRPath expressions to index, `CUSTOM_EXTENSION_SEARCH_PARAMS` holds
//! pre-extracted side-table values, and `RESOURCE_HISTORY` is the
//! append-only version log.
//!
//! # Architecture
//!
//! - [`adapter`] - the narrow dialect seam (embedded SQLite / PostgreSQL)
//! - [`naming`] - name mapping and the single SQL literal formatter
//! - [`schema`] - bundled DDL and catalog seed
//! - [`catalog`] - search-parameter catalog, standard and custom
//! - [`fhirpath`] - the path-expression collaborator
//! - [`extract`] - search-parameter value extraction
//! - [`references`] - the reference edge graph
//! - [`history`] - the version-history log
//! - [`tx`] - per-request compensating transactions
//! - [`engine`] - the create/update/patch/delete write verbs
//! - [`read`] / [`search`] - the read and search engines
//! - [`store`] - the facade the HTTP layer talks to
//!
//! # Quick start
//!
//! ```no_run
//! use vireo_persistence::{SqlAdapter, Store, StoreConfig};
//! use serde_json::json;
//!
//! # async fn demo() -> vireo_persistence::StoreResult<()> {
//! let adapter = SqlAdapter::sqlite_in_memory()?;
//! let store = Store::new(adapter, StoreConfig::default());
//! store.bootstrap(false).await?;
//!
//! let created = store
//!     .create("Patient", json!({
//!         "resourceType": "Patient",
//!         "name": [{"family": "Doe"}]
//!     }))
//!     .await?;
//! assert_eq!(created["meta"]["versionId"], json!("1"));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fhirpath;
pub mod history;
pub mod naming;
pub mod read;
pub mod references;
pub mod schema;
pub mod search;
pub mod store;
pub mod tx;

pub use adapter::SqlAdapter;
pub use error::{StoreError, StoreResult};
pub use history::HistoryEntry;
pub use naming::Dialect;
pub use search::{SearchOutcome, SearchRequest};
pub use store::{Store, StoreConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
