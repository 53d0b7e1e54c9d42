//! Instance history and version read:
//! `GET [base]/{type}/{id}/_history[/{vid}]`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;

use crate::error::{RestError, RestResult};
use crate::responses::{fhir_json, history_bundle};
use crate::state::AppState;

/// Returns the full version history of an instance as a history Bundle.
pub async fn history_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> RestResult<Response> {
    let entries = state.store().history(&resource_type, &id).await?;
    let bundle = history_bundle(state.base_url(), &resource_type, &id, &entries);
    Ok(fhir_json(StatusCode::OK, &bundle))
}

/// Returns one specific version of an instance.
pub async fn vread_handler(
    State(state): State<AppState>,
    Path((resource_type, id, version_id)): Path<(String, String, String)>,
) -> RestResult<Response> {
    let version: i64 = version_id
        .parse()
        .map_err(|_| RestError::bad_request(format!("invalid version id '{version_id}'")))?;
    let resource = state.store().vread(&resource_type, &id, version).await?;
    Ok(fhir_json(StatusCode::OK, &resource))
}
