//! Create interaction: `POST [base]/{type}`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::RestResult;
use crate::responses::FHIR_JSON;
use crate::routes::BASE_PATH;
use crate::state::AppState;

use super::parse_body;

/// Creates a resource; returns `201 Created` with a Location header.
pub async fn create_handler(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    body: Bytes,
) -> RestResult<Response> {
    let resource = parse_body(&body)?;
    let created = state.store().create(&resource_type, resource).await?;

    let id = created
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let location = format!("{}{BASE_PATH}/{resource_type}/{id}", state.base_url());
    debug!(resource_type = %resource_type, id = %id, "resource created");

    Ok((
        StatusCode::CREATED,
        [
            (header::CONTENT_TYPE, FHIR_JSON.to_string()),
            (header::LOCATION, location),
        ],
        created.to_string(),
    )
        .into_response())
}
