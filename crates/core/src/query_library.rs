use async_trait::async_trait;
use thiserror::Error;

use crate::error::{BackendError, ValidationError};

/// One run as recorded by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub query: String,
    pub timestamp: Option<String>,
    pub execution_time_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedQuery {
    pub id: Option<i64>,
    pub title: String,
    pub query: String,
    pub is_public: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSavedQuery {
    pub title: String,
    pub query: String,
    pub is_public: bool,
}

#[derive(Debug, Error)]
pub enum QueryLibraryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Backend(#[source] BackendError),
}

#[async_trait]
pub trait QueryLibraryBackend {
    /// Newest first.
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, BackendError>;
    async fn save_query(&self, query: &NewSavedQuery) -> Result<Option<i64>, BackendError>;
    async fn fetch_saved_queries(&self) -> Result<Vec<SavedQuery>, BackendError>;
    async fn list_databases(&self) -> Result<Vec<String>, BackendError>;
    /// Returns the backend's confirmation message, if it sent one.
    async fn create_database(&self, name: &str) -> Result<Option<String>, BackendError>;
}

#[derive(Debug)]
pub struct QueryLibrary<B: QueryLibraryBackend> {
    backend: B,
}

impl<B: QueryLibraryBackend> QueryLibrary<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, QueryLibraryError> {
        self.backend
            .fetch_history()
            .await
            .map_err(QueryLibraryError::Backend)
    }

    pub async fn save(&self, query: NewSavedQuery) -> Result<Option<i64>, QueryLibraryError> {
        let title = query.title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingField { field: "title" }.into());
        }
        if query.query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        let normalized = NewSavedQuery {
            title: title.to_string(),
            query: query.query,
            is_public: query.is_public,
        };
        self.backend
            .save_query(&normalized)
            .await
            .map_err(QueryLibraryError::Backend)
    }

    pub async fn saved_queries(&self) -> Result<Vec<SavedQuery>, QueryLibraryError> {
        self.backend
            .fetch_saved_queries()
            .await
            .map_err(QueryLibraryError::Backend)
    }

    pub async fn databases(&self) -> Result<Vec<String>, QueryLibraryError> {
        self.backend
            .list_databases()
            .await
            .map_err(QueryLibraryError::Backend)
    }

    /// The name is spliced into `CREATE DATABASE` on the server, so only
    /// plain identifiers are sent.
    pub async fn create_database(&self, name: &str) -> Result<String, QueryLibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        if !is_plain_identifier(name) {
            return Err(ValidationError::InvalidDatabaseName {
                name: name.to_string(),
            }
            .into());
        }

        let message = self
            .backend
            .create_database(name)
            .await
            .map_err(QueryLibraryError::Backend)?;
        Ok(message.unwrap_or_else(|| format!("Database '{name}' created successfully.")))
    }
}

fn is_plain_identifier(name: &str) -> bool {
    name.len() <= 64
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !name.starts_with(|ch: char| ch.is_ascii_digit())
}
