//! Pipeline execution.
//!
//! Documents flow one at a time: reader → annotators in computed order →
//! consumers in declared order, all against one shared mutable document.
//! A stage failure is logged, recorded to history, and processing of the
//! document continues with the next stage; only reader and history
//! failures abort the run.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::document::Document;
use crate::error::StageError;
use crate::history::{HistorySink, StageEvent};

use super::Pipeline;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Collection reader failed: {0}")]
    Reader(#[source] StageError),

    #[error("History sink failed: {0}")]
    History(#[source] StageError),
}

/// Aggregate counts for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub documents: usize,
    pub annotator_failures: usize,
    pub consumer_failures: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    #[must_use]
    pub fn stage_failures(&self) -> usize {
        self.annotator_failures + self.consumer_failures
    }
}

pub struct PipelineExecutor<'a> {
    pipeline: &'a mut Pipeline,
}

impl<'a> PipelineExecutor<'a> {
    #[must_use]
    pub fn new(pipeline: &'a mut Pipeline) -> Self {
        Self { pipeline }
    }

    /// Drain the reader, processing every document through the stage list.
    pub async fn run(&mut self) -> Result<RunSummary, ExecutionError> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        loop {
            let next = self
                .pipeline
                .reader
                .component
                .next_document()
                .await
                .map_err(ExecutionError::Reader)?;
            let Some(mut document) = next else {
                break;
            };

            self.process(&mut document, &mut summary).await?;
            summary.documents += 1;
        }

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            pipeline = %self.pipeline.name,
            documents = summary.documents,
            failures = summary.stage_failures(),
            duration_ms = summary.duration_ms,
            "pipeline run complete"
        );
        Ok(summary)
    }

    async fn process(
        &mut self,
        document: &mut Document,
        summary: &mut RunSummary,
    ) -> Result<(), ExecutionError> {
        let history = Arc::clone(&self.pipeline.history);
        let pipeline_name = self.pipeline.name.clone();

        for stage in &self.pipeline.annotators {
            let started = Instant::now();
            let result = stage.component.annotate(document).await;
            let duration = elapsed_ms(started);

            let event = match result {
                Ok(()) => StageEvent::completed(
                    pipeline_name.as_str(),
                    stage.id,
                    stage.class(),
                    document.id.as_str(),
                    duration,
                ),
                Err(error) => {
                    tracing::error!(
                        stage = %stage.id,
                        class = stage.class(),
                        document = %document.id,
                        %error,
                        "annotator failed, continuing with next stage"
                    );
                    summary.annotator_failures += 1;
                    StageEvent::failed(
                        pipeline_name.as_str(),
                        stage.id,
                        stage.class(),
                        document.id.as_str(),
                        duration,
                        &error,
                    )
                }
            };

            record(&*history, event).await?;
        }

        for stage in &self.pipeline.consumers {
            let started = Instant::now();
            let result = stage.component.consume(document).await;
            let duration = elapsed_ms(started);

            let event = match result {
                Ok(()) => StageEvent::completed(
                    pipeline_name.as_str(),
                    stage.id,
                    stage.class(),
                    document.id.as_str(),
                    duration,
                ),
                Err(error) => {
                    tracing::error!(
                        stage = %stage.id,
                        class = stage.class(),
                        document = %document.id,
                        %error,
                        "consumer failed, continuing with next stage"
                    );
                    summary.consumer_failures += 1;
                    StageEvent::failed(
                        pipeline_name.as_str(),
                        stage.id,
                        stage.class(),
                        document.id.as_str(),
                        duration,
                        &error,
                    )
                }
            };

            record(&*history, event).await?;
        }

        Ok(())
    }
}

async fn record(history: &dyn HistorySink, event: StageEvent) -> Result<(), ExecutionError> {
    history.record(event).await.map_err(ExecutionError::History)
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
