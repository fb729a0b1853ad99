//! Run-history sinks.
//!
//! The executor records one event per stage invocation; where those events
//! go is pluggable like any other component. The default sink writes them
//! to the log; the in-memory sink keeps them for inspection, which is what
//! tests and short-lived runs want.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Params;
use crate::error::StageError;
use crate::registry::HistoryFactory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Failed(String),
}

impl StageOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Provenance for one stage invocation against one document.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub pipeline: String,
    pub stage_id: Uuid,
    pub stage_class: String,
    pub document_id: String,
    pub outcome: StageOutcome,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl StageEvent {
    #[must_use]
    pub fn completed(
        pipeline: impl Into<String>,
        stage_id: Uuid,
        stage_class: impl Into<String>,
        document_id: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            stage_id,
            stage_class: stage_class.into(),
            document_id: document_id.into(),
            outcome: StageOutcome::Completed,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(
        pipeline: impl Into<String>,
        stage_id: Uuid,
        stage_class: impl Into<String>,
        document_id: impl Into<String>,
        duration_ms: u64,
        error: &StageError,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            stage_id,
            stage_class: stage_class.into(),
            document_id: document_id.into(),
            outcome: StageOutcome::Failed(error.to_string()),
            duration_ms,
            recorded_at: Utc::now(),
        }
    }
}

/// Where stage invocation records go. Failures here are treated as fatal by
/// the executor: history is bookkeeping the run cannot do without.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, event: StageEvent) -> Result<(), StageError>;
}

/// Default sink: every event becomes a log line.
pub struct LoggingHistory;

#[async_trait]
impl HistorySink for LoggingHistory {
    async fn record(&self, event: StageEvent) -> Result<(), StageError> {
        match &event.outcome {
            StageOutcome::Completed => tracing::info!(
                pipeline = %event.pipeline,
                stage = %event.stage_id,
                class = %event.stage_class,
                document = %event.document_id,
                duration_ms = event.duration_ms,
                "stage completed"
            ),
            StageOutcome::Failed(error) => tracing::warn!(
                pipeline = %event.pipeline,
                stage = %event.stage_id,
                class = %event.stage_class,
                document = %event.document_id,
                duration_ms = event.duration_ms,
                %error,
                "stage failed"
            ),
        }
        Ok(())
    }
}

/// Keeps events in memory for later inspection.
#[derive(Default)]
pub struct InMemoryHistory {
    events: Mutex<Vec<StageEvent>>,
}

impl InMemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistorySink for InMemoryHistory {
    async fn record(&self, event: StageEvent) -> Result<(), StageError> {
        self.events
            .lock()
            .map_err(|_| StageError::Failed("history mutex poisoned".into()))?
            .push(event);
        Ok(())
    }
}

pub struct LoggingHistoryFactory;

impl HistoryFactory for LoggingHistoryFactory {
    fn create(&self, _params: &Params) -> Result<Arc<dyn HistorySink>, StageError> {
        Ok(Arc::new(LoggingHistory))
    }
}

pub struct InMemoryHistoryFactory;

impl HistoryFactory for InMemoryHistoryFactory {
    fn create(&self, _params: &Params) -> Result<Arc<dyn HistorySink>, StageError> {
        Ok(Arc::new(InMemoryHistory::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_history_records_in_order() {
        let history = InMemoryHistory::new();
        let stage = Uuid::new_v4();

        history
            .record(StageEvent::completed("p", stage, "a", "doc1", 3))
            .await
            .unwrap();
        history
            .record(StageEvent::failed(
                "p",
                stage,
                "a",
                "doc2",
                1,
                &StageError::Failed("boom".into()),
            ))
            .await
            .unwrap();

        let events = history.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].document_id, "doc1");
        assert!(!events[0].outcome.is_failure());
        assert!(events[1].outcome.is_failure());
    }
}
