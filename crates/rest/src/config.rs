//! Server configuration.
//!
//! Built from command line arguments with environment variable fallbacks:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `VIREO_PORT` | 8080 | Server port |
//! | `VIREO_HOST` | 127.0.0.1 | Host to bind |
//! | `VIREO_LOG_LEVEL` | info | Log level |
//! | `VIREO_BACKEND` | sqlite | Storage backend (`sqlite` or `postgres`) |
//! | `VIREO_DATABASE_URL` | vireo.db | File path or `postgres://` URL |
//! | `VIREO_DATABASE_USER` | - | Database user override |
//! | `VIREO_DATABASE_PASSWORD` | - | Database password override |
//! | `VIREO_BASE_URL` | http://localhost:8080 | Base URL for fullUrl/Location |

use clap::Parser;

/// Which storage backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Postgres,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// Configuration for the Vireo FHIR server.
#[derive(Debug, Clone, Parser)]
#[command(name = "vireo", about = "Vireo FHIR R4 resource server")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(short, long, env = "VIREO_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "VIREO_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "VIREO_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Storage backend: sqlite or postgres.
    #[arg(long, env = "VIREO_BACKEND", default_value = "sqlite")]
    pub backend: String,

    /// Database location: a file path (sqlite) or a postgres:// URL.
    #[arg(long, env = "VIREO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Database user, overriding the URL.
    #[arg(long, env = "VIREO_DATABASE_USER")]
    pub database_user: Option<String>,

    /// Database password, overriding the URL.
    #[arg(long, env = "VIREO_DATABASE_PASSWORD")]
    pub database_password: Option<String>,

    /// Wipe all data and reseed the search-parameter catalog on startup.
    #[arg(long, env = "VIREO_CLEAR_ON_STARTUP", default_value_t = false)]
    pub clear_on_startup: bool,

    /// Require client-supplied resource ids on create instead of assigning
    /// server-side UUIDs.
    #[arg(long, env = "VIREO_CLIENT_ASSIGNED_IDS", default_value_t = false)]
    pub client_assigned_ids: bool,

    /// Base URL used to build Location headers and Bundle fullUrl values.
    #[arg(long, env = "VIREO_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Default search page size when the query carries no _count.
    #[arg(long, env = "VIREO_PAGE_SIZE", default_value_t = 20)]
    pub default_page_size: u32,
}

impl ServerConfig {
    /// The socket address to bind.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses the configured backend name.
    pub fn storage_backend(&self) -> Result<StorageBackend, String> {
        match self.backend.as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => Err(format!(
                "unknown backend '{other}' (expected 'sqlite' or 'postgres')"
            )),
        }
    }

    /// Whether the store should assign resource ids.
    pub fn server_assigned_ids(&self) -> bool {
        !self.client_assigned_ids
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            backend: "sqlite".to_string(),
            database_url: None,
            database_user: None,
            database_password: None,
            clear_on_startup: false,
            client_assigned_ids: false,
            base_url: "http://localhost:8080".to_string(),
            default_page_size: 20,
        }
    }
}
