//! Search interaction: `GET [base]/{type}?…`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::debug;

use vireo_persistence::SearchRequest;

use crate::error::{RestError, RestResult};
use crate::responses::{fhir_json, searchset_bundle};
use crate::state::AppState;

/// Runs a type-level search and wraps the outcome in a searchset Bundle.
///
/// `page` is peeled off here; everything else, `_`-controls included, goes
/// to the search engine for classification.
pub async fn search_handler(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Query(raw_params): Query<Vec<(String, String)>>,
) -> RestResult<Response> {
    let mut page: u32 = 1;
    let mut params = Vec::with_capacity(raw_params.len());
    for (name, value) in raw_params {
        if name == "page" {
            page = value
                .parse()
                .map_err(|_| RestError::bad_request(format!("invalid page value '{value}'")))?;
        } else {
            params.push((name, value));
        }
    }

    let mut request = SearchRequest::new(params);
    request.page = page.max(1);
    request.count = state.config().default_page_size;

    debug!(resource_type = %resource_type, page, "running search");
    let outcome = state.store().search(&resource_type, &request).await?;
    Ok(fhir_json(
        StatusCode::OK,
        &searchset_bundle(state.base_url(), &outcome),
    ))
}
