//! Version history: monotone numbering, vread, history-after-delete.

mod common;

use common::{appointment, client_id_store, seed_triangle};
use serde_json::json;
use vireo_persistence::StoreError;

#[tokio::test]
async fn versions_climb_one_per_write() {
    let store = client_id_store().await;
    seed_triangle(&store).await;

    let mut fulfilled = appointment(
        "test-appt-001",
        "fulfilled",
        &["Patient/test-patient-001", "Practitioner/test-prac-001"],
    );
    fulfilled["comment"] = json!("follow-up");
    store
        .update("Appointment", "test-appt-001", fulfilled)
        .await
        .unwrap();

    let entries = store.history("Appointment", "test-appt-001").await.unwrap();
    let versions: Vec<i64> = entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(entries[1].operation, "POST");
    assert_eq!(entries[0].operation, "PUT");

    // The current row carries the latest version.
    let current = store.read("Appointment", "test-appt-001").await.unwrap();
    assert_eq!(current["meta"]["versionId"], json!("2"));
    assert_eq!(current["status"], json!("fulfilled"));
}

#[tokio::test]
async fn vread_returns_the_body_of_that_version() {
    let store = client_id_store().await;
    seed_triangle(&store).await;
    store
        .update(
            "Appointment",
            "test-appt-001",
            appointment(
                "test-appt-001",
                "fulfilled",
                &["Patient/test-patient-001", "Practitioner/test-prac-001"],
            ),
        )
        .await
        .unwrap();

    let first = store.vread("Appointment", "test-appt-001", 1).await.unwrap();
    assert_eq!(first["status"], json!("booked"));
    assert_eq!(first["meta"]["versionId"], json!("1"));

    let second = store.vread("Appointment", "test-appt-001", 2).await.unwrap();
    assert_eq!(second["status"], json!("fulfilled"));
}

#[tokio::test]
async fn vread_of_a_missing_version_is_not_found() {
    let store = client_id_store().await;
    seed_triangle(&store).await;

    let err = store
        .vread("Appointment", "test-appt-001", 9)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn history_of_an_unknown_instance_is_not_found() {
    let store = client_id_store().await;
    let err = store.history("Patient", "ghost").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn history_survives_deletion() {
    let store = client_id_store().await;
    seed_triangle(&store).await;
    store
        .update(
            "Appointment",
            "test-appt-001",
            appointment(
                "test-appt-001",
                "fulfilled",
                &["Patient/test-patient-001", "Practitioner/test-prac-001"],
            ),
        )
        .await
        .unwrap();

    store.delete("Appointment", "test-appt-001").await.unwrap();
    store.delete("Patient", "test-patient-001").await.unwrap();
    store.delete("Practitioner", "test-prac-001").await.unwrap();

    let entries = store.history("Appointment", "test-appt-001").await.unwrap();
    let versions: Vec<i64> = entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![3, 2, 1]);
    assert_eq!(entries[0].operation, "DELETE");
    // The delete entry preserves the last-known body.
    assert_eq!(entries[0].resource["status"], json!("fulfilled"));

    let patient_history = store.history("Patient", "test-patient-001").await.unwrap();
    assert_eq!(patient_history.len(), 2);
}

#[tokio::test]
async fn patch_appends_a_put_history_entry() {
    let store = client_id_store().await;
    seed_triangle(&store).await;

    store
        .patch("Appointment", "test-appt-001", json!({"status": "arrived"}))
        .await
        .unwrap();

    let entries = store.history("Appointment", "test-appt-001").await.unwrap();
    assert_eq!(entries[0].operation, "PUT");
    assert_eq!(entries[0].resource["status"], json!("arrived"));
    // Untouched fields survive the merge into the new version.
    assert!(entries[0].resource["participant"].is_array());
}
