use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::error::BackendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|table| table.columns.len()).sum()
    }
}

/// Table node of the entity-relationship view. Relations are passed through
/// as the backend reports them.
#[derive(Debug, Clone, PartialEq)]
pub struct ErTable {
    pub name: String,
    pub columns: Vec<String>,
    pub relations: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErDiagram {
    pub tables: Vec<ErTable>,
}

impl ErDiagram {
    #[must_use]
    pub fn relation_count(&self) -> usize {
        self.tables.iter().map(|table| table.relations.len()).sum()
    }
}

#[derive(Debug, Error)]
pub enum SchemaCacheError {
    #[error("schema refresh failed: {0}")]
    Backend(#[source] BackendError),
    #[error("ER diagram unavailable: {0}")]
    Diagram(#[source] BackendError),
}

#[async_trait]
pub trait SchemaBackend {
    async fn fetch_schema(&self) -> Result<SchemaSnapshot, BackendError>;
    async fn fetch_er_diagram(&self) -> Result<ErDiagram, BackendError>;
}

/// Last-fetched table inventory. A refresh swaps the whole snapshot, so
/// readers holding an `Arc` keep a consistent view.
#[derive(Debug)]
pub struct SchemaCacheService<B: SchemaBackend> {
    backend: B,
    cache: Option<Arc<SchemaSnapshot>>,
}

impl<B: SchemaBackend> SchemaCacheService<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: None,
        }
    }

    #[must_use]
    pub fn cached(&self) -> Option<Arc<SchemaSnapshot>> {
        self.cache.clone()
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Returns the cached snapshot, fetching one first if none is held.
    pub async fn snapshot(&mut self) -> Result<Arc<SchemaSnapshot>, SchemaCacheError> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    /// Fetches a fresh snapshot. On failure the previous one is kept.
    pub async fn refresh(&mut self) -> Result<Arc<SchemaSnapshot>, SchemaCacheError> {
        let snapshot = Arc::new(
            self.backend
                .fetch_schema()
                .await
                .map_err(SchemaCacheError::Backend)?,
        );
        debug!(
            "schema refreshed: {} tables, {} columns",
            snapshot.tables.len(),
            snapshot.column_count()
        );

        self.cache = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub async fn list_tables(&mut self) -> Result<Vec<String>, SchemaCacheError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .tables
            .iter()
            .map(|table| table.name.clone())
            .collect())
    }

    pub async fn list_columns(&mut self, table_name: &str) -> Result<Vec<String>, SchemaCacheError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .table(table_name)
            .map(|table| table.columns.clone())
            .unwrap_or_default())
    }

    /// Always fetched fresh; the diagram is not cached.
    pub async fn er_diagram(&self) -> Result<ErDiagram, SchemaCacheError> {
        self.backend
            .fetch_er_diagram()
            .await
            .map_err(SchemaCacheError::Diagram)
    }
}
