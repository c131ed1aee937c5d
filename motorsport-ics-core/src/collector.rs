//! Concurrent source collection.
//!
//! Sources run on a bounded pool (`buffer_unordered`), each attempt under its
//! own timeout. Transient failures are retried with linear backoff; a global
//! deadline cancels whatever is still in flight while results from finished
//! sources are kept.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use futures::{StreamExt, stream};
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    Error, RawEvent,
    config::CollectionConfig,
    sources::{CancelSignal, FetchContext, Source, SourceBatch, SourceRegistry},
};

/// Final state of one source after collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SourceStatus {
    Success,
    SuccessAfterRetry { attempts: u32 },
    TransientFailureExhausted { attempts: u32, error: String },
    Failed { error: String },
    Cancelled,
}

impl SourceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessAfterRetry { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessAfterRetry { .. } => "success-after-retry",
            Self::TransientFailureExhausted { .. } => "transient-failure-exhausted",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Status record emitted for every registered source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub priority: u32,
    pub status: SourceStatus,
    /// Attempts started, 0 when cancelled before the first one
    pub attempts: u32,
    pub elapsed: Duration,
    pub events: usize,
}

/// Events collected from one source.
#[derive(Debug, Clone)]
pub struct CollectedBatch {
    pub source: String,
    pub priority: u32,
    pub batch: SourceBatch,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    /// Successful batches, in registration order
    pub batches: Vec<CollectedBatch>,
    /// One report per registered source, in registration order
    pub reports: Vec<SourceReport>,
}

impl CollectionResult {
    pub fn event_count(&self) -> usize {
        self.batches.iter().map(|b| b.batch.events.len()).sum()
    }

    pub fn events(&self) -> impl Iterator<Item = &RawEvent> {
        self.batches.iter().flat_map(|b| b.batch.events.iter())
    }

    pub fn report(&self, source: &str) -> Option<&SourceReport> {
        self.reports.iter().find(|r| r.source == source)
    }
}

enum Outcome {
    Collected { batch: SourceBatch, attempts: u32 },
    Exhausted { error: Error, attempts: u32 },
    Failed(Error),
    Cancelled,
}

pub struct SourceCollector {
    config: CollectionConfig,
}

impl SourceCollector {
    pub fn new(config: CollectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Collect with a fresh deadline of `deadline_secs` from now.
    pub async fn collect(&self, registry: &SourceRegistry) -> CollectionResult {
        let cancel = CancelSignal::new(Instant::now() + self.config.deadline());
        self.collect_until(registry, cancel).await
    }

    /// Collect every registered source until `cancel` fires.
    pub async fn collect_until(
        &self,
        registry: &SourceRegistry,
        cancel: CancelSignal,
    ) -> CollectionResult {
        tracing::info!(
            sources = registry.len(),
            max_concurrency = self.config.max_concurrency,
            "Starting collection"
        );

        let mut finished: Vec<(usize, SourceReport, Option<SourceBatch>)> =
            stream::iter(registry.sources().iter().cloned().enumerate())
                .map(|(idx, source)| {
                    let cancel = cancel.clone();
                    async move {
                        let (report, batch) = self.run_source(source, cancel).await;
                        (idx, report, batch)
                    }
                })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .collect()
                .await;

        finished.sort_by_key(|(idx, _, _)| *idx);

        let mut result = CollectionResult::default();
        for (_, report, batch) in finished {
            if let Some(batch) = batch {
                result.batches.push(CollectedBatch {
                    source: report.source.clone(),
                    priority: report.priority,
                    batch,
                });
            }
            result.reports.push(report);
        }

        tracing::info!(
            events = result.event_count(),
            succeeded = result.reports.iter().filter(|r| r.status.is_success()).count(),
            "Collection finished"
        );
        result
    }

    async fn run_source(
        &self,
        source: Arc<dyn Source>,
        cancel: CancelSignal,
    ) -> (SourceReport, Option<SourceBatch>) {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        let outcome = if cancel.is_cancelled() {
            Outcome::Cancelled
        } else {
            tokio::select! {
                outcome = self.attempt_loop(source.as_ref(), &cancel, &attempts) => outcome,
                _ = cancel.cancelled() => Outcome::Cancelled,
            }
        };

        let attempts = attempts.load(Ordering::Relaxed);
        let (status, batch) = match outcome {
            Outcome::Collected { batch, attempts: 1 } => (SourceStatus::Success, Some(batch)),
            Outcome::Collected { batch, attempts } => {
                (SourceStatus::SuccessAfterRetry { attempts }, Some(batch))
            }
            Outcome::Exhausted { error, attempts } => (
                SourceStatus::TransientFailureExhausted {
                    attempts,
                    error: error.to_string(),
                },
                None,
            ),
            Outcome::Failed(error) => (
                SourceStatus::Failed {
                    error: error.to_string(),
                },
                None,
            ),
            Outcome::Cancelled => (SourceStatus::Cancelled, None),
        };

        let report = SourceReport {
            source: source.name().to_string(),
            priority: source.priority(),
            status,
            attempts,
            elapsed: started.elapsed(),
            events: batch.as_ref().map_or(0, |b| b.events.len()),
        };

        match &report.status {
            SourceStatus::Success | SourceStatus::SuccessAfterRetry { .. } => tracing::info!(
                source = %report.source,
                events = report.events,
                attempts = report.attempts,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Source collected"
            ),
            SourceStatus::Cancelled => {
                tracing::warn!(source = %report.source, attempts = report.attempts, "Source cancelled")
            }
            status => tracing::warn!(
                source = %report.source,
                status = status.label(),
                attempts = report.attempts,
                "Source failed"
            ),
        }

        (report, batch)
    }

    async fn attempt_loop(
        &self,
        source: &dyn Source,
        cancel: &CancelSignal,
        attempts: &AtomicU32,
    ) -> Outcome {
        let max_attempts = self.config.max_retries + 1;
        let timeout = source.timeout().unwrap_or_else(|| self.config.source_timeout());

        for attempt in 1..=max_attempts {
            attempts.store(attempt, Ordering::Relaxed);
            let ctx = FetchContext {
                attempt,
                timeout,
                cancel: cancel.clone(),
            };

            let result = match tokio::time::timeout(timeout, source.fetch(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout),
            };

            let error = match result {
                Ok(batch) => return Outcome::Collected { batch, attempts: attempt },
                Err(Error::Cancelled) => return Outcome::Cancelled,
                Err(error) if !error.is_transient() => return Outcome::Failed(error),
                Err(error) => error,
            };

            if attempt == max_attempts {
                return Outcome::Exhausted {
                    error,
                    attempts: attempt,
                };
            }

            let delay = self.config.retry_delay() * attempt;
            tracing::debug!(
                source = source.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
        }

        // max_attempts >= 1, so the loop always returns
        Outcome::Cancelled
    }
}
