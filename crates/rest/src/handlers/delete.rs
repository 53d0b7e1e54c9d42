//! Delete interaction: `DELETE [base]/{type}/{id}`. Hard delete, 200.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::debug;

use crate::error::RestResult;
use crate::responses::operation_outcome::deleted_outcome;
use crate::responses::fhir_json;
use crate::state::AppState;

/// Deletes a resource. History is retained; subsequent reads return 404.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> RestResult<Response> {
    state.store().delete(&resource_type, &id).await?;
    debug!(resource_type = %resource_type, id = %id, "resource deleted");
    Ok(fhir_json(
        StatusCode::OK,
        &deleted_outcome(&resource_type, &id),
    ))
}
