//! Bounded-concurrency execution of independent tasks.
//!
//! Every task is driven to completion; a failing task never cancels its
//! siblings. Outcomes come back in input order regardless of which task
//! finished first.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;

/// Outcome of a task once it has completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Fulfilled(value) => Ok(value),
            Self::Rejected(reason) => Err(reason),
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Fulfilled(value),
            Err(reason) => Self::Rejected(reason),
        }
    }
}

/// Number of workers for a requested limit: `max(1, min(limit, tasks))`
pub fn effective_limit(requested: i64, task_count: usize) -> usize {
    let requested = usize::try_from(requested.max(1)).unwrap_or(usize::MAX);
    requested.min(task_count).max(1)
}

/// Run `tasks` with at most `limit` in flight, returning every settled outcome
///
/// A limit of zero or below behaves as one; a limit above the task count
/// behaves as the task count. Workers share one claim counter, so each task is
/// started exactly once, in index order.
pub async fn run_with_concurrency_limit<T, E, Fut>(limit: i64, tasks: Vec<Fut>) -> Vec<Settled<T, E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    let total = tasks.len();
    let workers = effective_limit(limit, total);

    let slots: Vec<Mutex<Option<Fut>>> = tasks.into_iter().map(|t| Mutex::new(Some(t))).collect();
    let outcomes: Mutex<Vec<(usize, Settled<T, E>)>> = Mutex::new(Vec::with_capacity(total));
    let next = AtomicUsize::new(0);

    let (slots_ref, outcomes_ref, next_ref) = (&slots, &outcomes, &next);
    join_all((0..workers).map(move |_| claim_loop(next_ref, slots_ref, outcomes_ref))).await;

    let mut settled = outcomes.into_inner().unwrap_or_else(PoisonError::into_inner);
    settled.sort_by_key(|(index, _)| *index);
    settled.into_iter().map(|(_, outcome)| outcome).collect()
}

/// One worker: claim the next index, run it, store the outcome, repeat
async fn claim_loop<T, E, Fut>(
    next: &AtomicUsize,
    slots: &[Mutex<Option<Fut>>],
    outcomes: &Mutex<Vec<(usize, Settled<T, E>)>>,
) where
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let index = next.fetch_add(1, Ordering::SeqCst);
        let Some(slot) = slots.get(index) else {
            break;
        };

        let task = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(task) = task else {
            continue;
        };

        let outcome = Settled::from(task.await);
        outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((index, outcome));
    }
}
