//! Shared harness for storage-engine integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use vireo_persistence::{SqlAdapter, Store, StoreConfig};

/// A bootstrapped in-memory store that requires client-supplied ids.
pub async fn client_id_store() -> Store {
    let adapter = SqlAdapter::sqlite_in_memory().expect("failed to open in-memory database");
    let store = Store::new(
        adapter,
        StoreConfig {
            server_assigned_ids: false,
        },
    );
    store.bootstrap(false).await.expect("failed to bootstrap schema");
    store
}

/// A bootstrapped in-memory store that assigns ids server-side.
pub async fn server_id_store() -> Store {
    let adapter = SqlAdapter::sqlite_in_memory().expect("failed to open in-memory database");
    let store = Store::new(adapter, StoreConfig::default());
    store.bootstrap(false).await.expect("failed to bootstrap schema");
    store
}

pub fn practitioner(id: &str) -> Value {
    json!({
        "resourceType": "Practitioner",
        "id": id,
        "active": true,
        "name": [{"family": "House", "given": ["Gregory"]}]
    })
}

pub fn patient(id: &str, family: &str, general_practitioner: Option<&str>) -> Value {
    let mut resource = json!({
        "resourceType": "Patient",
        "id": id,
        "gender": "female",
        "birthDate": "1980-06-15",
        "name": [{"family": family, "given": ["Jane"]}],
        "identifier": [{"system": "http://hospital.org/mrn", "value": "12345"}]
    });
    if let Some(reference) = general_practitioner {
        resource["generalPractitioner"] = json!([{"reference": reference}]);
    }
    resource
}

pub fn appointment(id: &str, status: &str, actors: &[&str]) -> Value {
    let participants: Vec<Value> = actors
        .iter()
        .map(|actor| json!({"actor": {"reference": actor}, "status": "accepted"}))
        .collect();
    json!({
        "resourceType": "Appointment",
        "id": id,
        "status": status,
        "start": "2024-03-01T09:00:00Z",
        "participant": participants
    })
}

/// Seeds the practitioner / patient / appointment triangle used across the
/// search and reference suites.
pub async fn seed_triangle(store: &Store) {
    store
        .create("Practitioner", practitioner("test-prac-001"))
        .await
        .expect("failed to create practitioner");
    store
        .create(
            "Patient",
            patient("test-patient-001", "Doe", Some("Practitioner/test-prac-001")),
        )
        .await
        .expect("failed to create patient");
    store
        .create(
            "Appointment",
            appointment(
                "test-appt-001",
                "booked",
                &["Patient/test-patient-001", "Practitioner/test-prac-001"],
            ),
        )
        .await
        .expect("failed to create appointment");
}

/// Counts the rows of a table through the store's adapter.
pub async fn count_rows(store: &Store, table: &str) -> i64 {
    store
        .adapter()
        .query_opt(&format!("SELECT COUNT(*) AS CNT FROM {table}"))
        .await
        .expect("count query failed")
        .and_then(|row| row.int("CNT"))
        .unwrap_or(0)
}
