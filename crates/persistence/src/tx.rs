//! Per-request compensating transactions.
//!
//! Writes do not lean on the SQL engine's transaction isolation. Each write
//! carries a [`TransactionContext`] that records what it changed (the main
//! row snapshot, edge ids written, edge rows deleted) and compensates in
//! reverse on failure. `commit` is advisory: it marks the context so later
//! rollback calls become no-ops. Compensation failures are logged and never
//! retried; they indicate a manual-repair condition.

use crate::adapter::{Record, SqlAdapter};
use crate::error::StoreResult;
use crate::naming::{self, quote_text};
use crate::references;
use crate::schema::REFERENCES_TABLE;

/// Which rollback protocol applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Create,
    Update,
    Delete,
}

/// Side-effect ledger for one write request.
#[derive(Debug)]
pub struct TransactionContext {
    kind: TxKind,
    resource_type: String,
    /// Set once the main row has been written (create) or identified (update/delete).
    pub main_resource_id: Option<String>,
    /// Edge ids inserted by this request, in insertion order.
    pub saved_reference_ids: Vec<String>,
    /// Edge ids deleted by this request (update path; informational).
    pub deleted_reference_ids: Vec<String>,
    /// Full main-row snapshot taken before mutation (update/delete).
    pub backup_resource: Option<Record>,
    /// Full edge-row snapshots taken before deletion (delete).
    pub backup_references: Vec<Record>,
    committed: bool,
}

impl TransactionContext {
    /// Context for a create; nothing to restore, everything to undo.
    pub fn for_create(resource_type: impl Into<String>) -> Self {
        Self {
            kind: TxKind::Create,
            resource_type: resource_type.into(),
            main_resource_id: None,
            saved_reference_ids: Vec::new(),
            deleted_reference_ids: Vec::new(),
            backup_resource: None,
            backup_references: Vec::new(),
            committed: false,
        }
    }

    /// Context for an update, carrying the pre-update row snapshot.
    pub fn for_update(resource_type: impl Into<String>, id: impl Into<String>, backup: Record) -> Self {
        Self {
            kind: TxKind::Update,
            resource_type: resource_type.into(),
            main_resource_id: Some(id.into()),
            saved_reference_ids: Vec::new(),
            deleted_reference_ids: Vec::new(),
            backup_resource: Some(backup),
            backup_references: Vec::new(),
            committed: false,
        }
    }

    /// Context for a delete, carrying row and edge snapshots.
    pub fn for_delete(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        backup: Record,
        backup_references: Vec<Record>,
    ) -> Self {
        Self {
            kind: TxKind::Delete,
            resource_type: resource_type.into(),
            main_resource_id: Some(id.into()),
            saved_reference_ids: Vec::new(),
            deleted_reference_ids: Vec::new(),
            backup_resource: Some(backup),
            backup_references,
            committed: false,
        }
    }

    /// Marks the request as complete; subsequent rollbacks are no-ops.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Runs the kind-specific compensation. Each step is attempted even when
    /// an earlier one fails; failures are logged with the repair context.
    pub async fn rollback(&mut self, adapter: &SqlAdapter) {
        if self.committed {
            return;
        }
        // A rollback is terminal for the context either way.
        self.committed = true;

        tracing::warn!(
            resource_type = %self.resource_type,
            id = ?self.main_resource_id,
            kind = ?self.kind,
            "rolling back failed write"
        );

        match self.kind {
            TxKind::Create => self.rollback_create(adapter).await,
            TxKind::Update => self.rollback_update(adapter).await,
            TxKind::Delete => self.rollback_delete(adapter).await,
        }
    }

    async fn rollback_create(&self, adapter: &SqlAdapter) {
        for edge_id in self.saved_reference_ids.iter().rev() {
            if let Err(e) = references::delete_edge(adapter, edge_id).await {
                self.log_compensation_failure("delete reference edge", &e);
            }
        }
        if let Some(id) = &self.main_resource_id {
            let table = naming::table_name(&self.resource_type);
            let pk = naming::primary_key(&self.resource_type);
            if let Err(e) = adapter
                .execute(&format!(
                    "DELETE FROM {table} WHERE {pk} = {}",
                    quote_text(id)
                ))
                .await
            {
                self.log_compensation_failure("delete main row", &e);
            }
        }
    }

    async fn rollback_update(&self, adapter: &SqlAdapter) {
        // Deleted edges are not restored; a retried update re-inserts them.
        if let (Some(id), Some(backup)) = (&self.main_resource_id, &self.backup_resource) {
            if let Err(e) = restore_row_update(adapter, &self.resource_type, id, backup).await {
                self.log_compensation_failure("restore main row", &e);
            }
        }
        for edge_id in self.saved_reference_ids.iter().rev() {
            if let Err(e) = references::delete_edge(adapter, edge_id).await {
                self.log_compensation_failure("delete reference edge", &e);
            }
        }
    }

    async fn rollback_delete(&self, adapter: &SqlAdapter) {
        if let Some(backup) = &self.backup_resource {
            if let Err(e) = reinsert_row(
                adapter,
                &naming::table_name(&self.resource_type),
                backup,
            )
            .await
            {
                self.log_compensation_failure("re-insert main row", &e);
            }
        }
        for edge in &self.backup_references {
            if let Err(e) = reinsert_row(adapter, REFERENCES_TABLE, edge).await {
                self.log_compensation_failure("re-insert reference edge", &e);
            }
        }
    }

    fn log_compensation_failure(&self, step: &str, error: &crate::error::StoreError) {
        tracing::error!(
            resource_type = %self.resource_type,
            id = ?self.main_resource_id,
            step,
            error = %error,
            "compensation failed; manual repair required"
        );
    }
}

/// UPDATEs a row back to its snapshot, setting every non-key column.
async fn restore_row_update(
    adapter: &SqlAdapter,
    resource_type: &str,
    id: &str,
    backup: &Record,
) -> StoreResult<()> {
    let table = naming::table_name(resource_type);
    let pk = naming::primary_key(resource_type);
    let dialect = adapter.dialect();

    let assignments: Vec<String> = backup
        .iter()
        .filter(|(column, _)| *column != pk)
        .map(|(column, field)| format!("{column} = {}", field.to_literal(dialect)))
        .collect();
    if assignments.is_empty() {
        return Ok(());
    }
    adapter
        .execute(&format!(
            "UPDATE {table} SET {} WHERE {pk} = {}",
            assignments.join(", "),
            quote_text(id)
        ))
        .await?;
    Ok(())
}

/// INSERTs a snapshot row verbatim, original primary key included.
async fn reinsert_row(adapter: &SqlAdapter, table: &str, snapshot: &Record) -> StoreResult<()> {
    let dialect = adapter.dialect();
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (column, field) in snapshot.iter() {
        columns.push(column.to_string());
        values.push(field.to_literal(dialect));
    }
    if columns.is_empty() {
        return Ok(());
    }
    adapter
        .execute(&format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        ))
        .await?;
    Ok(())
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::extract::PendingEdge;
    use crate::read;

    async fn adapter_with_schema() -> SqlAdapter {
        let adapter = SqlAdapter::sqlite_in_memory().unwrap();
        crate::schema::bootstrap(&adapter, false).await.unwrap();
        adapter
    }

    async fn insert_patient(adapter: &SqlAdapter, id: &str, family: &str) {
        adapter
            .execute(&format!(
                "INSERT INTO PatientTable \
                 (PATIENTTABLE_ID, VERSION_ID, CREATED_AT, UPDATED_AT, LAST_UPDATED, \
                  RESOURCE_JSON, FAMILY) \
                 VALUES ('{id}', 1, '2024-01-01 00:00:00.000', '2024-01-01 00:00:00.000', \
                 '2024-01-01 00:00:00.000', X'7b7d', '{family}')"
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_rollback_removes_row_and_edges() {
        let adapter = adapter_with_schema().await;
        insert_patient(&adapter, "p1", "Doe").await;

        let edge_id = references::insert_edge(
            &adapter,
            "Patient",
            "p1",
            &PendingEdge {
                expression: "generalPractitioner".to_string(),
                target_type: "Practitioner".to_string(),
                target_id: "d1".to_string(),
                display: None,
            },
        )
        .await
        .unwrap();

        let mut ctx = TransactionContext::for_create("Patient");
        ctx.main_resource_id = Some("p1".to_string());
        ctx.saved_reference_ids.push(edge_id);
        ctx.rollback(&adapter).await;

        assert!(!read::exists(&adapter, "Patient", "p1").await.unwrap());
        assert!(references::edge_ids_by_source(&adapter, "Patient", "p1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_rollback_restores_snapshot() {
        let adapter = adapter_with_schema().await;
        insert_patient(&adapter, "p1", "Doe").await;
        let backup = read::fetch_row(&adapter, "Patient", "p1").await.unwrap().unwrap();

        adapter
            .execute("UPDATE PatientTable SET FAMILY = 'Changed', VERSION_ID = 2 WHERE PATIENTTABLE_ID = 'p1'")
            .await
            .unwrap();

        let mut ctx = TransactionContext::for_update("Patient", "p1", backup);
        ctx.rollback(&adapter).await;

        let row = read::fetch_row(&adapter, "Patient", "p1").await.unwrap().unwrap();
        assert_eq!(row.text("FAMILY"), Some("Doe"));
        assert_eq!(row.int("VERSION_ID"), Some(1));
    }

    #[tokio::test]
    async fn delete_rollback_rematerialises_row_and_edges() {
        let adapter = adapter_with_schema().await;
        insert_patient(&adapter, "p1", "Doe").await;
        references::insert_edge(
            &adapter,
            "Patient",
            "p1",
            &PendingEdge {
                expression: "generalPractitioner".to_string(),
                target_type: "Practitioner".to_string(),
                target_id: "d1".to_string(),
                display: None,
            },
        )
        .await
        .unwrap();

        let backup = read::fetch_row(&adapter, "Patient", "p1").await.unwrap().unwrap();
        let edges = references::edges_by_source(&adapter, "Patient", "p1").await.unwrap();

        references::delete_edges_by_source(&adapter, "Patient", "p1").await.unwrap();
        adapter
            .execute("DELETE FROM PatientTable WHERE PATIENTTABLE_ID = 'p1'")
            .await
            .unwrap();

        let mut ctx = TransactionContext::for_delete("Patient", "p1", backup, edges);
        ctx.rollback(&adapter).await;

        assert!(read::exists(&adapter, "Patient", "p1").await.unwrap());
        assert_eq!(
            references::edge_ids_by_source(&adapter, "Patient", "p1")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn committed_context_does_not_compensate() {
        let adapter = adapter_with_schema().await;
        insert_patient(&adapter, "p1", "Doe").await;

        let mut ctx = TransactionContext::for_create("Patient");
        ctx.main_resource_id = Some("p1".to_string());
        ctx.commit();
        ctx.rollback(&adapter).await;

        assert!(read::exists(&adapter, "Patient", "p1").await.unwrap());
    }
}
