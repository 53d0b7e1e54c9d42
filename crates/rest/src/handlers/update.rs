//! Update interaction: `PUT [base]/{type}/{id}`. No create-on-update.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::debug;

use crate::error::RestResult;
use crate::responses::fhir_json;
use crate::state::AppState;

use super::parse_body;

/// Replaces a resource in full.
pub async fn update_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    body: Bytes,
) -> RestResult<Response> {
    let resource = parse_body(&body)?;
    let updated = state.store().update(&resource_type, &id, resource).await?;
    debug!(resource_type = %resource_type, id = %id, "resource updated");
    Ok(fhir_json(StatusCode::OK, &updated))
}
