//! Time-budgeted, cancellable execution of a single task.
//!
//! The task races a deadline and an optional cancellation token. Losing the
//! race drops the task future; work the task already handed off elsewhere
//! keeps running unless it watches the same token.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Limits applied to one task
#[derive(Debug, Clone)]
pub struct Budget {
    /// Maximum wall-clock time to wait for the task
    pub max: Duration,

    /// External cancellation signal
    pub cancel: Option<CancellationToken>,
}

impl Budget {
    pub fn new(max: Duration) -> Self {
        Self { max, cancel: None }
    }

    pub fn from_millis(max_ms: u64) -> Self {
        Self::new(Duration::from_millis(max_ms))
    }

    /// Also stop waiting when `token` is cancelled
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Why a budgeted task did not produce a value
#[derive(Debug, Error)]
pub enum BudgetError<E> {
    #[error("Budget of {}ms exceeded", .budget.as_millis())]
    Exceeded { budget: Duration },

    #[error("Aborted by cancellation")]
    Aborted,

    #[error("{0}")]
    Task(E),
}

impl<E> BudgetError<E> {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Run `task` within `budget`
///
/// Returns the task's own value or error if it finishes first. A token that is
/// already cancelled aborts without polling the task. The timer and the
/// cancellation listener live inside this future and are dropped on every exit.
pub async fn with_budget<T, E, Fut>(budget: &Budget, task: Fut) -> Result<T, BudgetError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    if budget.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
        return Err(BudgetError::Aborted);
    }

    let cancelled = async {
        match &budget.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        outcome = task => outcome.map_err(BudgetError::Task),
        _ = cancelled => Err(BudgetError::Aborted),
        _ = tokio::time::sleep(budget.max) => Err(BudgetError::Exceeded { budget: budget.max }),
    }
}
