use std::sync::Arc;

use crate::query_runner::{ExecutionOutcome, StatementResult};

/// Holds the outcome of the most recent successful run. Only a successful
/// run replaces it; failures leave the previous value in place.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    latest: Option<Arc<ExecutionOutcome>>,
    successful_runs: u64,
}

impl ResultCache {
    pub fn store(&mut self, outcome: Arc<ExecutionOutcome>) {
        self.latest = Some(outcome);
        self.successful_runs += 1;
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<ExecutionOutcome>> {
        self.latest.clone()
    }

    /// The statement a results view shows by default: the last one that
    /// returned columns, falling back to the last statement.
    #[must_use]
    pub fn primary_statement(&self) -> Option<&StatementResult> {
        let outcome = self.latest.as_deref()?;
        outcome
            .statements
            .iter()
            .rev()
            .find(|statement| statement.has_rows())
            .or_else(|| outcome.statements.last())
    }

    /// Successful runs since the session started.
    #[must_use]
    pub fn successful_runs(&self) -> u64 {
        self.successful_runs
    }
}
