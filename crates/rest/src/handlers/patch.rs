//! Patch interaction: `PATCH [base]/{type}/{id}` with a shallow JSON merge.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::debug;

use crate::error::RestResult;
use crate::responses::fhir_json;
use crate::state::AppState;

use super::parse_body;

/// Shallow-merges the request over the stored document and returns the
/// merged resource.
pub async fn patch_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    body: Bytes,
) -> RestResult<Response> {
    let patch = parse_body(&body)?;
    let merged = state.store().patch(&resource_type, &id, patch).await?;
    debug!(resource_type = %resource_type, id = %id, "resource patched");
    Ok(fhir_json(StatusCode::OK, &merged))
}
