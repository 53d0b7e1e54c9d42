//! Route table for the FHIR REST API.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Every FHIR route hangs off this base path.
pub const BASE_PATH: &str = "/fhir/r4";

/// Builds the full application router.
///
/// # Routes
///
/// - `GET /metadata` - CapabilityStatement
/// - `GET /{type}` - search, `POST /{type}` - create
/// - `GET|PUT|PATCH|DELETE /{type}/{id}` - instance interactions
/// - `GET /{type}/{id}/_history` - instance history
/// - `GET /{type}/{id}/_history/{vid}` - version read
pub fn create_app(state: AppState) -> Router {
    let fhir = Router::new()
        .route("/metadata", get(handlers::metadata_handler))
        .route(
            "/{resource_type}",
            get(handlers::search_handler).post(handlers::create_handler),
        )
        .route(
            "/{resource_type}/{id}",
            get(handlers::read_handler)
                .put(handlers::update_handler)
                .patch(handlers::patch_handler)
                .delete(handlers::delete_handler),
        )
        .route(
            "/{resource_type}/{id}/_history",
            get(handlers::history_handler),
        )
        .route(
            "/{resource_type}/{id}/_history/{version_id}",
            get(handlers::vread_handler),
        )
        .with_state(state);

    Router::new()
        .nest(BASE_PATH, fhir)
        .layer(TraceLayer::new_for_http())
}
