//! Response building: FHIR JSON bodies, Bundles, OperationOutcomes.

pub mod bundle;
pub mod operation_outcome;

pub use bundle::{history_bundle, searchset_bundle};
pub use operation_outcome::operation_outcome;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

/// The FHIR JSON media type used on every response.
pub const FHIR_JSON: &str = "application/fhir+json";

/// Builds a response with the FHIR JSON content type.
pub fn fhir_json(status: StatusCode, body: &Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, FHIR_JSON)],
        body.to_string(),
    )
        .into_response()
}
