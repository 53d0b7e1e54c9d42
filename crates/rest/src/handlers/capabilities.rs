//! Server metadata: `GET [base]/metadata`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

use vireo_persistence::schema::RESOURCE_TYPES;

use crate::error::RestResult;
use crate::responses::fhir_json;
use crate::state::AppState;

/// Returns the server's CapabilityStatement.
pub async fn metadata_handler(State(state): State<AppState>) -> RestResult<Response> {
    let resources: Vec<_> = RESOURCE_TYPES
        .iter()
        .map(|resource_type| {
            json!({
                "type": resource_type,
                "interaction": [
                    {"code": "create"},
                    {"code": "read"},
                    {"code": "update"},
                    {"code": "patch"},
                    {"code": "delete"},
                    {"code": "history-instance"},
                    {"code": "vread"},
                    {"code": "search-type"}
                ]
            })
        })
        .collect();

    let statement = json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "kind": "instance",
        "fhirVersion": "4.0.1",
        "format": ["application/fhir+json"],
        "implementation": {
            "description": "Vireo FHIR R4 resource server",
            "url": state.base_url()
        },
        "rest": [{
            "mode": "server",
            "resource": resources
        }]
    });
    Ok(fhir_json(StatusCode::OK, &statement))
}
