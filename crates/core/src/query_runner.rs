use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::connection_manager::ConnectionDescriptor;
use crate::error::{BackendError, ValidationError};
use crate::performance_log::{PerformanceLog, PerformanceRecord};
use crate::result_cache::ResultCache;

/// Runs slower than this raise the advisory slow-query flag.
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(1_000);

#[must_use]
pub fn is_slow(elapsed: Duration) -> bool {
    elapsed > SLOW_QUERY_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub text: String,
    pub connection: Option<ConnectionDescriptor>,
    pub explain: bool,
}

impl QueryRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            connection: None,
            explain: false,
        }
    }

    #[must_use]
    pub fn with_connection(mut self, connection: Option<ConnectionDescriptor>) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

/// One statement's result as the backend reported it, before alignment checks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawStatement {
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunResponse {
    pub statements: Vec<RawStatement>,
    pub explanation: Option<Value>,
    pub execution_time_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementResult {
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub message: Option<String>,
}

impl StatementResult {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn has_rows(&self) -> bool {
        !self.columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub statements: Vec<StatementResult>,
    pub explanation: Option<Value>,
    pub elapsed: Duration,
    pub server_elapsed_ms: Option<f64>,
    pub is_slow: bool,
}

impl ExecutionOutcome {
    /// True for runs that succeeded without returning any statement result,
    /// which is how some backends acknowledge DDL.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    #[must_use]
    pub fn first_row_count(&self) -> usize {
        self.statements
            .first()
            .map_or(0, StatementResult::row_count)
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000.0
    }
}

#[derive(Debug, Error)]
pub enum QueryRunnerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Backend(#[source] BackendError),
    #[error(
        "statement {statement} row {row} has {found} values but only {expected} columns"
    )]
    MalformedResult {
        statement: usize,
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[async_trait]
pub trait QueryBackend {
    async fn run_query(&self, request: &QueryRequest) -> Result<RunResponse, BackendError>;
}

#[derive(Debug)]
pub struct QueryDispatcher<B: QueryBackend> {
    backend: B,
}

impl<B: QueryBackend> QueryDispatcher<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Sends one request and folds the response into the caches.
    ///
    /// Blank text is rejected before the backend is called. On success the
    /// performance record is appended first, then the result cache is
    /// replaced. A failed run leaves both untouched. Nothing is retried.
    pub async fn dispatch(
        &self,
        request: &QueryRequest,
        results: &mut ResultCache,
        performance: &mut PerformanceLog,
    ) -> Result<Arc<ExecutionOutcome>, QueryRunnerError> {
        if request.text.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        let started_at = Instant::now();
        debug!("dispatching query ({} chars)", request.text.len());
        let response = self
            .backend
            .run_query(request)
            .await
            .map_err(QueryRunnerError::Backend)?;
        let elapsed = started_at.elapsed();

        let statements = align_statements(response.statements)?;
        let outcome = Arc::new(ExecutionOutcome {
            statements,
            explanation: response.explanation,
            elapsed,
            server_elapsed_ms: response.execution_time_ms,
            is_slow: is_slow(elapsed),
        });

        let row_count = u64::try_from(outcome.first_row_count()).unwrap_or(u64::MAX);
        if let Err(error) =
            performance.record(PerformanceRecord::new(&request.text, elapsed, row_count))
        {
            warn!("failed to persist performance log: {error}");
        }
        results.store(Arc::clone(&outcome));

        if outcome.is_slow {
            warn!("slow query detected: {:.0}ms", outcome.elapsed_ms());
        }

        Ok(outcome)
    }
}

/// Pads short rows with explicit nulls so every row matches the column list.
/// Rows wider than the column list cannot be aligned and are rejected.
fn align_statements(
    statements: Vec<RawStatement>,
) -> Result<Vec<StatementResult>, QueryRunnerError> {
    statements
        .into_iter()
        .enumerate()
        .map(|(statement_index, raw)| {
            let expected = raw.columns.len();
            let mut rows = raw.rows;
            for (row_index, row) in rows.iter_mut().enumerate() {
                if row.len() > expected {
                    return Err(QueryRunnerError::MalformedResult {
                        statement: statement_index,
                        row: row_index,
                        expected,
                        found: row.len(),
                    });
                }
                row.resize(expected, Value::Null);
            }

            Ok(StatementResult {
                query: raw.query,
                columns: raw.columns,
                rows,
                message: raw.message,
            })
        })
        .collect()
}
