//! Create / read / update / patch / delete behaviour.

mod common;

use common::{client_id_store, count_rows, patient, practitioner, server_id_store};
use serde_json::json;
use vireo_persistence::StoreError;

#[tokio::test]
async fn create_then_read_returns_the_request_body() {
    let store = client_id_store().await;
    let body = patient("p1", "Doe", None);

    let created = store.create("Patient", body.clone()).await.unwrap();
    assert_eq!(created["meta"]["versionId"], json!("1"));
    assert!(created["meta"]["lastUpdated"].is_string());

    let fetched = store.read("Patient", "p1").await.unwrap();
    assert_eq!(fetched["name"], body["name"]);
    assert_eq!(fetched["gender"], body["gender"]);
    assert_eq!(fetched["id"], json!("p1"));
    assert_eq!(fetched["meta"]["versionId"], json!("1"));
}

#[tokio::test]
async fn create_collision_is_a_conflict() {
    let store = client_id_store().await;
    store.create("Patient", patient("p1", "Doe", None)).await.unwrap();

    let err = store
        .create("Patient", patient("p1", "Doe", None))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[tokio::test]
async fn create_without_id_fails_when_client_ids_required() {
    let store = client_id_store().await;
    let err = store
        .create("Patient", json!({"resourceType": "Patient"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn server_assigned_ids_are_dashless() {
    let store = server_id_store().await;
    let created = store
        .create("Patient", json!({"resourceType": "Patient"}))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();
    assert_eq!(id.len(), 32);
    assert!(!id.contains('-'));

    let fetched = store.read("Patient", id).await.unwrap();
    assert_eq!(fetched["id"], json!(id));
}

#[tokio::test]
async fn body_resource_type_must_match() {
    let store = client_id_store().await;
    let err = store
        .create("Patient", json!({"resourceType": "Appointment", "id": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn unsupported_resource_type_is_rejected() {
    let store = client_id_store().await;
    let err = store
        .create("Widget", json!({"resourceType": "Widget", "id": "w1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn read_missing_resource_is_not_found() {
    let store = client_id_store().await;
    let err = store.read("Patient", "ghost").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn update_replaces_all_fields() {
    let store = client_id_store().await;
    store.create("Patient", patient("p1", "Doe", None)).await.unwrap();

    let replacement = json!({
        "resourceType": "Patient",
        "id": "p1",
        "name": [{"family": "Smith"}]
    });
    let updated = store.update("Patient", "p1", replacement).await.unwrap();
    assert_eq!(updated["meta"]["versionId"], json!("2"));

    let fetched = store.read("Patient", "p1").await.unwrap();
    assert_eq!(fetched["name"][0]["family"], json!("Smith"));
    // PUT is a full replace: the old gender is gone.
    assert!(fetched.get("gender").is_none());
}

#[tokio::test]
async fn update_missing_resource_is_not_found() {
    let store = client_id_store().await;
    let err = store
        .update("Patient", "ghost", json!({"resourceType": "Patient", "id": "ghost"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn update_with_mismatched_body_id_is_rejected() {
    let store = client_id_store().await;
    store.create("Patient", patient("p1", "Doe", None)).await.unwrap();

    let err = store
        .update("Patient", "p1", json!({"resourceType": "Patient", "id": "other"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn patch_merges_shallowly_and_preserves_other_fields() {
    let store = client_id_store().await;
    store.create("Patient", patient("p1", "Doe", None)).await.unwrap();

    let patched = store
        .patch("Patient", "p1", json!({"gender": "male"}))
        .await
        .unwrap();
    assert_eq!(patched["gender"], json!("male"));
    assert_eq!(patched["name"][0]["family"], json!("Doe"));
    assert_eq!(patched["meta"]["versionId"], json!("2"));

    let fetched = store.read("Patient", "p1").await.unwrap();
    assert_eq!(fetched["gender"], json!("male"));
    assert_eq!(fetched["birthDate"], json!("1980-06-15"));
}

#[tokio::test]
async fn patch_missing_resource_is_not_found() {
    let store = client_id_store().await;
    let err = store
        .patch("Patient", "ghost", json!({"gender": "male"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn delete_removes_the_row_but_keeps_history() {
    let store = client_id_store().await;
    store
        .create("Practitioner", practitioner("d1"))
        .await
        .unwrap();

    store.delete("Practitioner", "d1").await.unwrap();

    let err = store.read("Practitioner", "d1").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    let entries = store.history("Practitioner", "d1").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].operation, "DELETE");
    assert_eq!(entries[0].version, 2);
}

#[tokio::test]
async fn delete_missing_resource_is_not_found() {
    let store = client_id_store().await;
    let err = store.delete("Patient", "ghost").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn delete_clears_edges_and_index_rows() {
    let store = client_id_store().await;
    store.create("Practitioner", practitioner("d1")).await.unwrap();
    store
        .create("Patient", patient("p1", "Doe", Some("Practitioner/d1")))
        .await
        .unwrap();

    assert!(count_rows(&store, "\"REFERENCES\"").await > 0);

    store.delete("Patient", "p1").await.unwrap();

    assert_eq!(count_rows(&store, "\"REFERENCES\"").await, 0);
    let index_rows = store
        .adapter()
        .query_opt(
            "SELECT COUNT(*) AS CNT FROM CUSTOM_EXTENSION_SEARCH_PARAMS WHERE RESOURCE_ID = 'p1'",
        )
        .await
        .unwrap()
        .unwrap()
        .int("CNT")
        .unwrap();
    assert_eq!(index_rows, 0);
}

#[tokio::test]
async fn client_meta_cannot_steer_version_numbers() {
    let store = client_id_store().await;
    let mut body = patient("p1", "Doe", None);
    body["meta"] = json!({"versionId": "42", "lastUpdated": "1970-01-01T00:00:00Z"});

    let created = store.create("Patient", body).await.unwrap();
    assert_eq!(created["meta"]["versionId"], json!("1"));

    let fetched = store.read("Patient", "p1").await.unwrap();
    assert_eq!(fetched["meta"]["versionId"], json!("1"));
    assert_ne!(fetched["meta"]["lastUpdated"], json!("1970-01-01T00:00:00Z"));
}
