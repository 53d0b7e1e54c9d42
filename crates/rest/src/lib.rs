//! Vireo FHIR Server HTTP surface.
//!
//! A thin axum layer over [`vireo_persistence`]: route table, request
//! handlers, OperationOutcome error mapping, and the server configuration.
//! All storage semantics live in the persistence crate; handlers parse,
//! delegate, and format.

pub mod config;
pub mod error;
pub mod handlers;
pub mod responses;
pub mod routes;
pub mod state;

pub use config::{ServerConfig, StorageBackend};
pub use error::{RestError, RestResult};
pub use routes::{create_app, BASE_PATH};
pub use state::AppState;

use tracing_subscriber::EnvFilter;

/// Initialises structured logging for the server binary.
pub fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
