//! Vireo FHIR Server.
//!
//! Parses configuration, opens the configured backend, bootstraps the
//! schema, and serves the FHIR REST API.

use clap::Parser;
use tracing::info;

use vireo_persistence::{SqlAdapter, Store, StoreConfig};
use vireo_rest::{create_app, init_logging, AppState, ServerConfig, StorageBackend};

fn open_adapter(config: &ServerConfig) -> anyhow::Result<SqlAdapter> {
    let backend = config
        .storage_backend()
        .map_err(|e| anyhow::anyhow!("invalid storage configuration: {e}"))?;

    match backend {
        StorageBackend::Sqlite => {
            let path = config.database_url.as_deref().unwrap_or("vireo.db");
            info!(database = %path, "opening embedded database");
            if path == ":memory:" {
                Ok(SqlAdapter::sqlite_in_memory()?)
            } else {
                Ok(SqlAdapter::sqlite(path)?)
            }
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("the postgres backend requires --database-url"))?;
            info!("connecting to PostgreSQL");
            Ok(SqlAdapter::postgres(
                url,
                config.database_user.as_deref(),
                config.database_password.as_deref(),
            )?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    let backend = config
        .storage_backend()
        .map_err(|e| anyhow::anyhow!("invalid storage configuration: {e}"))?;
    info!(
        host = %config.host,
        port = config.port,
        backend = %backend,
        "starting Vireo FHIR server"
    );

    let adapter = open_adapter(&config)?;
    let store = Store::new(
        adapter,
        StoreConfig {
            server_assigned_ids: config.server_assigned_ids(),
        },
    );
    store.bootstrap(config.clear_on_startup).await?;
    info!(cleared = config.clear_on_startup, "schema ready");

    let app = create_app(AppState::new(store, config.clone()));
    let addr = config.socket_addr();
    info!(address = %addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
