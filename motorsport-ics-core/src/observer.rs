use crate::{
    CalendarEntry, CategoryResolution, Error, RawEvent,
    collector::SourceReport,
    dedup::DuplicateCluster,
    pipeline::RunStats,
};

/// Hooks into a pipeline run. Every method defaults to doing nothing.
pub trait PipelineObserver: Send + Sync {
    fn collection_started(&self, _sources: usize) {}

    fn source_finished(&self, _report: &SourceReport) {}

    /// An event was dropped before classification.
    fn event_discarded(&self, _event: &RawEvent, _reason: &str) {}

    fn event_classified(&self, _event: &RawEvent, _category: &CategoryResolution) {}

    fn cluster_merged(&self, _cluster: &DuplicateCluster) {}

    fn entry_suppressed(&self, _entry: &CalendarEntry) {}

    /// Learned mappings could not be saved; the run continues.
    fn persistence_failed(&self, _error: &Error) {}

    fn run_finished(&self, _stats: &RunStats) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Forwards pipeline events to `tracing`.
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn collection_started(&self, sources: usize) {
        tracing::info!(sources, "Collecting events");
    }

    fn source_finished(&self, report: &SourceReport) {
        tracing::info!(
            source = %report.source,
            status = report.status.label(),
            attempts = report.attempts,
            events = report.events,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Source finished"
        );
    }

    fn event_discarded(&self, event: &RawEvent, reason: &str) {
        tracing::debug!(source = %event.source, name = %event.name, reason, "Event discarded");
    }

    fn event_classified(&self, event: &RawEvent, category: &CategoryResolution) {
        tracing::debug!(
            name = %event.name,
            code = %category.code,
            confidence = category.confidence,
            provenance = category.provenance.as_str(),
            "Event classified"
        );
    }

    fn cluster_merged(&self, cluster: &DuplicateCluster) {
        let representative = cluster.representative();
        tracing::info!(
            representative = %representative.name(),
            source = %representative.source(),
            members = cluster.members.len(),
            "Duplicates merged"
        );
    }

    fn entry_suppressed(&self, entry: &CalendarEntry) {
        tracing::info!(uid = %entry.uid, name = %entry.name, "Entry hidden by silent period");
    }

    fn persistence_failed(&self, error: &Error) {
        tracing::warn!(error = %error, "Learned mappings not saved, continuing in memory");
    }

    fn run_finished(&self, stats: &RunStats) {
        tracing::info!(
            collected = stats.collected,
            unresolved = stats.unresolved,
            outside_window = stats.outside_window,
            merged = stats.merged,
            emitted = stats.emitted,
            suppressed = stats.suppressed,
            "Run finished"
        );
    }
}
