//! FHIR OperationOutcome documents.

use serde_json::{json, Value};

/// Builds a single-issue OperationOutcome.
pub fn operation_outcome(severity: &str, code: &str, diagnostics: &str) -> Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": severity,
            "code": code,
            "diagnostics": diagnostics
        }]
    })
}

/// The informational outcome returned by a successful delete.
pub fn deleted_outcome(resource_type: &str, id: &str) -> Value {
    operation_outcome(
        "information",
        "informational",
        &format!("Successfully deleted {resource_type}/{id}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_shape() {
        let outcome = operation_outcome("error", "not-found", "resource not found: Patient/x");
        assert_eq!(outcome["resourceType"], json!("OperationOutcome"));
        assert_eq!(outcome["issue"][0]["severity"], json!("error"));
        assert_eq!(outcome["issue"][0]["code"], json!("not-found"));
    }
}
