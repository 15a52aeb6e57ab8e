//! Bounded Concurrency Integration Tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use toolplan::core::{effective_limit, run_with_concurrency_limit, Settled};

/// Tracks how many tasks are running at once
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

async fn run_tracked(limit: i64, durations: &[u64]) -> (Vec<Settled<usize, String>>, usize) {
    let tracker = Arc::new(InFlight::default());

    let tasks: Vec<_> = durations
        .iter()
        .copied()
        .enumerate()
        .map(|(index, ms)| {
            let tracker = tracker.clone();
            async move {
                tracker.enter();
                tokio::time::sleep(Duration::from_millis(ms)).await;
                tracker.leave();
                if index % 3 == 2 {
                    Err(format!("task {} failed", index))
                } else {
                    Ok(index)
                }
            }
        })
        .collect();

    let outcomes = run_with_concurrency_limit(limit, tasks).await;
    (outcomes, tracker.peak())
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    // Later tasks finish first
    let (outcomes, _) = run_tracked(4, &[80, 60, 40, 20, 5]).await;

    assert_eq!(
        outcomes,
        vec![
            Settled::Fulfilled(0),
            Settled::Fulfilled(1),
            Settled::Rejected("task 2 failed".to_string()),
            Settled::Fulfilled(3),
            Settled::Fulfilled(4),
        ]
    );
}

#[tokio::test]
async fn test_in_flight_never_exceeds_limit() {
    let (outcomes, peak) = run_tracked(2, &[30, 10, 20, 10, 30, 10]).await;

    assert_eq!(outcomes.len(), 6);
    assert!(peak <= 2, "peak in flight was {}", peak);
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_non_positive_limit_runs_one_at_a_time() {
    for limit in [0, -1] {
        let (outcomes, peak) = run_tracked(limit, &[10, 10, 10]).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(peak, 1, "limit {} should behave as 1", limit);
    }
}

#[tokio::test]
async fn test_limit_above_task_count_runs_everything() {
    let (outcomes, peak) = run_tracked(100, &[20, 20, 20]).await;

    assert_eq!(outcomes.iter().filter(|o| o.is_fulfilled()).count(), 2);
    assert!(peak <= 3);
    assert_eq!(effective_limit(100, 3), 3);
}

#[tokio::test]
async fn test_rejection_does_not_stop_siblings() {
    let (outcomes, _) = run_tracked(1, &[5, 5, 5, 5, 5, 5]).await;

    let rejected: Vec<_> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| !o.is_fulfilled())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(rejected, vec![2, 5]);
}
