//! Optional observers attached to the engine.
//!
//! Observers see every [`Event`] a run emits. They are side channels only:
//! the engine's results never depend on them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{Event, EventType};

/// Receives events emitted during orchestration
#[async_trait]
pub trait ExecutionObserver: Send + Sync {
    async fn observe(&self, event: &Event);
}

/// Emits every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

#[async_trait]
impl ExecutionObserver for TracingObserver {
    async fn observe(&self, event: &Event) {
        let run_id = event.run_id;
        match event.event_type {
            EventType::StepFailed | EventType::PlanRejected => warn!(
                %run_id,
                step = ?event.step_index,
                capability = ?event.capability,
                kind = ?event.error_kind,
                error = ?event.error,
                "{}",
                event.summary
            ),
            EventType::RunStarted | EventType::RunCompleted => {
                info!(%run_id, "{}", event.summary)
            }
            _ => debug!(
                %run_id,
                step = ?event.step_index,
                duration_ms = ?event.duration_ms,
                "{}",
                event.summary
            ),
        }
    }
}

/// Fan-out to a list of observers
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver an event to every observer, in registration order
    pub async fn emit(&self, event: Event) {
        for observer in &self.observers {
            observer.observe(&event).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Collects events in memory
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<Event>>,
    }

    impl RecordingObserver {
        pub fn event_types(&self) -> Vec<EventType> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type)
                .collect()
        }
    }

    #[async_trait]
    impl ExecutionObserver for RecordingObserver {
        async fn observe(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingObserver;
    use super::*;
    use crate::domain::StepStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_emit_reaches_every_observer() {
        let first = Arc::new(RecordingObserver::default());
        let second = Arc::new(RecordingObserver::default());

        let mut observers = Observers::new();
        observers.push(first.clone());
        observers.push(Arc::new(TracingObserver));
        observers.push(second.clone());

        let event = Event::new(
            Uuid::new_v4(),
            EventType::RunStarted,
            "key".to_string(),
            "Run started".to_string(),
            StepStatus::Running,
        );
        observers.emit(event).await;

        assert_eq!(observers.len(), 3);
        assert_eq!(first.event_types(), vec![EventType::RunStarted]);
        assert_eq!(second.event_types(), vec![EventType::RunStarted]);
    }
}
