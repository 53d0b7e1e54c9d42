//! The storage facade handed to the HTTP layer.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::SqlAdapter;
use crate::engine::{self, WriteLocks};
use crate::error::{StoreError, StoreResult};
use crate::history::{self, HistoryEntry};
use crate::read;
use crate::schema;
use crate::search::{self, SearchOutcome, SearchRequest};

/// Behavioural switches for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Assign ids server-side (UUID-v1, dashes stripped) instead of
    /// requiring them from the client.
    pub server_assigned_ids: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            server_assigned_ids: true,
        }
    }
}

/// A FHIR resource store over one SQL backend.
#[derive(Debug)]
pub struct Store {
    adapter: Arc<SqlAdapter>,
    config: StoreConfig,
    locks: WriteLocks,
}

impl Store {
    pub fn new(adapter: SqlAdapter, config: StoreConfig) -> Self {
        Self {
            adapter: Arc::new(adapter),
            config,
            locks: WriteLocks::default(),
        }
    }

    /// The underlying adapter, for bootstrap and tests.
    pub fn adapter(&self) -> &SqlAdapter {
        &self.adapter
    }

    /// Creates tables and seeds the catalog; optionally wipes data first.
    pub async fn bootstrap(&self, clear: bool) -> StoreResult<()> {
        schema::bootstrap(&self.adapter, clear).await
    }

    /// POST: create a resource, returning the stored document.
    pub async fn create(&self, resource_type: &str, body: Value) -> StoreResult<Value> {
        engine::create(
            &self.adapter,
            &self.locks,
            resource_type,
            body,
            self.config.server_assigned_ids,
        )
        .await
    }

    /// GET: read the current version of a resource.
    pub async fn read(&self, resource_type: &str, id: &str) -> StoreResult<Value> {
        read::read(&self.adapter, resource_type, id).await
    }

    /// PUT: replace a resource. No create-on-update.
    pub async fn update(&self, resource_type: &str, id: &str, body: Value) -> StoreResult<Value> {
        engine::update(&self.adapter, &self.locks, resource_type, id, body).await
    }

    /// PATCH: shallow-merge over the stored document.
    pub async fn patch(&self, resource_type: &str, id: &str, body: Value) -> StoreResult<Value> {
        engine::patch(&self.adapter, &self.locks, resource_type, id, body).await
    }

    /// DELETE: hard-delete the current row, retaining history.
    pub async fn delete(&self, resource_type: &str, id: &str) -> StoreResult<()> {
        engine::delete(&self.adapter, &self.locks, resource_type, id).await
    }

    /// GET `_history`: every version of an instance, newest first.
    pub async fn history(&self, resource_type: &str, id: &str) -> StoreResult<Vec<HistoryEntry>> {
        let entries = history::versions(&self.adapter, resource_type, id).await?;
        if entries.is_empty() {
            return Err(StoreError::not_found(resource_type, id));
        }
        Ok(entries)
    }

    /// GET `_history/{vid}`: one specific version.
    pub async fn vread(&self, resource_type: &str, id: &str, version: i64) -> StoreResult<Value> {
        history::version(&self.adapter, resource_type, id, version)
            .await?
            .map(|entry| entry.resource)
            .ok_or_else(|| {
                StoreError::not_found(resource_type, format!("{id}/_history/{version}"))
            })
    }

    /// GET `/{Type}?…`: search one resource type.
    pub async fn search(
        &self,
        resource_type: &str,
        request: &SearchRequest,
    ) -> StoreResult<SearchOutcome> {
        search::search(&self.adapter, resource_type, request).await
    }
}
