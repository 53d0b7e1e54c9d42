//! Referential integrity: edge lifecycle and validation.

mod common;

use common::{appointment, client_id_store, count_rows, patient, practitioner, seed_triangle};
use serde_json::json;
use vireo_persistence::StoreError;

async fn edge_targets(store: &vireo_persistence::Store, source_type: &str, source_id: &str) -> Vec<String> {
    let rows = store
        .adapter()
        .query(&format!(
            "SELECT TARGET_RESOURCE_TYPE, TARGET_RESOURCE_ID FROM \"REFERENCES\" \
             WHERE SOURCE_RESOURCE_TYPE = '{source_type}' AND SOURCE_RESOURCE_ID = '{source_id}' \
             ORDER BY TARGET_RESOURCE_TYPE"
        ))
        .await
        .unwrap();
    rows.iter()
        .map(|row| {
            format!(
                "{}/{}",
                row.text("TARGET_RESOURCE_TYPE").unwrap(),
                row.text("TARGET_RESOURCE_ID").unwrap()
            )
        })
        .collect()
}

#[tokio::test]
async fn create_writes_one_edge_per_distinct_reference() {
    let store = client_id_store().await;
    seed_triangle(&store).await;

    assert_eq!(
        edge_targets(&store, "Appointment", "test-appt-001").await,
        vec!["Patient/test-patient-001", "Practitioner/test-prac-001"]
    );
    assert_eq!(
        edge_targets(&store, "Patient", "test-patient-001").await,
        vec!["Practitioner/test-prac-001"]
    );
}

#[tokio::test]
async fn update_rewrites_the_edge_set() {
    let store = client_id_store().await;
    seed_triangle(&store).await;

    // Drop the practitioner from the appointment.
    store
        .update(
            "Appointment",
            "test-appt-001",
            appointment("test-appt-001", "fulfilled", &["Patient/test-patient-001"]),
        )
        .await
        .unwrap();

    assert_eq!(
        edge_targets(&store, "Appointment", "test-appt-001").await,
        vec!["Patient/test-patient-001"]
    );
}

#[tokio::test]
async fn dangling_references_are_rejected_with_422_material() {
    let store = client_id_store().await;
    store.create("Practitioner", practitioner("d1")).await.unwrap();

    let err = store
        .create(
            "Patient",
            patient("p1", "Doe", Some("Practitioner/ghost")),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidReference { reference } if reference == "Practitioner/ghost"
    ));
}

#[tokio::test]
async fn absolute_urls_are_not_validated_or_indexed_as_edges() {
    let store = client_id_store().await;
    let mut body = patient("p1", "Doe", None);
    body["generalPractitioner"] = json!([{"reference": "http://elsewhere.example/fhir/Practitioner/remote"}]);

    store.create("Patient", body).await.unwrap();
    assert_eq!(count_rows(&store, "\"REFERENCES\"").await, 0);
}

#[tokio::test]
async fn display_values_are_carried_on_edges() {
    let store = client_id_store().await;
    store.create("Practitioner", practitioner("d1")).await.unwrap();
    let mut body = patient("p1", "Doe", None);
    body["generalPractitioner"] = json!([{"reference": "Practitioner/d1", "display": "Dr. House"}]);
    store.create("Patient", body).await.unwrap();

    let row = store
        .adapter()
        .query_opt(
            "SELECT DISPLAY_VALUE, SOURCE_EXPRESSION FROM \"REFERENCES\" \
             WHERE SOURCE_RESOURCE_ID = 'p1'",
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.text("DISPLAY_VALUE"), Some("Dr. House"));
    assert_eq!(row.text("SOURCE_EXPRESSION"), Some("generalPractitioner"));
}

#[tokio::test]
async fn reference_column_carries_a_convenience_copy() {
    let store = client_id_store().await;
    store.create("Practitioner", practitioner("d1")).await.unwrap();
    store
        .create("Patient", patient("p1", "Doe", Some("Practitioner/d1")))
        .await
        .unwrap();

    let row = store
        .adapter()
        .query_opt("SELECT GENERAL_PRACTITIONER FROM PatientTable WHERE PATIENTTABLE_ID = 'p1'")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.text("GENERAL_PRACTITIONER"), Some("Practitioner/d1"));
}
