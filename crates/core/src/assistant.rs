use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::{BackendError, ValidationError};

pub const NO_SQL_GENERATED: &str = "-- No SQL generated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecommendation {
    pub table: String,
    pub column: String,
    pub reason: Option<String>,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySuggestion {
    pub sql: String,
    pub explanation: Option<String>,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Backend(#[source] BackendError),
}

#[async_trait]
pub trait AssistantBackend {
    /// Execution plan for `query`. The payload shape depends on the database
    /// and is only displayed, never interpreted.
    async fn explain(&self, query: &str) -> Result<Value, BackendError>;
    async fn recommend_indexes(&self, query: &str)
        -> Result<Vec<IndexRecommendation>, BackendError>;
    async fn suggest(&self, prompt: &str) -> Result<QuerySuggestion, BackendError>;
}

#[derive(Debug)]
pub struct Assistant<B: AssistantBackend> {
    backend: B,
}

impl<B: AssistantBackend> Assistant<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn explain(&self, query: &str) -> Result<Value, AssistantError> {
        let query = non_blank(query).ok_or(ValidationError::EmptyQuery)?;
        self.backend
            .explain(query)
            .await
            .map_err(AssistantError::Backend)
    }

    pub async fn recommend_indexes(
        &self,
        query: &str,
    ) -> Result<Vec<IndexRecommendation>, AssistantError> {
        let query = non_blank(query).ok_or(ValidationError::EmptyQuery)?;
        let mut recommendations = self
            .backend
            .recommend_indexes(query)
            .await
            .map_err(AssistantError::Backend)?;

        let mut seen = std::collections::HashSet::new();
        recommendations.retain(|recommendation| {
            seen.insert((
                recommendation.table.to_ascii_lowercase(),
                recommendation.column.to_ascii_lowercase(),
            ))
        });
        Ok(recommendations)
    }

    pub async fn suggest(&self, prompt: &str) -> Result<QuerySuggestion, AssistantError> {
        let prompt = non_blank(prompt).ok_or(ValidationError::EmptyPrompt)?;
        let mut suggestion = self
            .backend
            .suggest(prompt)
            .await
            .map_err(AssistantError::Backend)?;

        if suggestion.sql.trim().is_empty() {
            suggestion.sql = NO_SQL_GENERATED.to_string();
        }
        Ok(suggestion)
    }
}

fn non_blank(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
