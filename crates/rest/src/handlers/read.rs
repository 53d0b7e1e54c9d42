//! Read interaction: `GET [base]/{type}/{id}`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;

use crate::error::RestResult;
use crate::responses::fhir_json;
use crate::state::AppState;

/// Reads the current version of a resource.
pub async fn read_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> RestResult<Response> {
    let resource = state.store().read(&resource_type, &id).await?;
    Ok(fhir_json(StatusCode::OK, &resource))
}
