//! End-to-end run: collect → resolve → window filter → classify → dedup → serialize.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    CalendarArtifact, NormalizedEvent, RawEvent, Result,
    category::CategoryClassifier,
    collector::{CollectionResult, SourceCollector, SourceStatus},
    config::PipelineConfig,
    datetime::DateTimeResolver,
    dedup::{DedupReport, Deduplicator},
    ics::CalendarSerializer,
    location::LocationManager,
    observer::{NoopObserver, PipelineObserver},
    similarity::SemanticOracle,
    sources::{CancelSignal, CancelTrigger, SourceRegistry},
    window::{WeekendDays, WeekendWindow, WeekendWindowCalculator},
};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub sources_cancelled: usize,
    pub collected: usize,
    pub unresolved: usize,
    pub outside_window: usize,
    /// Classified events per provenance tag
    pub classified: BTreeMap<String, usize>,
    pub learned_mappings: usize,
    pub merged: usize,
    pub emitted: usize,
    pub suppressed: usize,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Calendar(CalendarArtifact),
    /// Nothing survived; not an error
    NoEvents,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub window: WeekendWindow,
    pub stats: RunStats,
    pub collection: CollectionResult,
    pub dedup: DedupReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    tz: Tz,
    registry: SourceRegistry,
    collector: SourceCollector,
    windows: WeekendWindowCalculator,
    locations: LocationManager,
    classifier: CategoryClassifier,
    deduplicator: Deduplicator,
    serializer: CalendarSerializer,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    /// Validate the configuration and wire every stage.
    pub fn new(config: PipelineConfig, registry: SourceRegistry) -> Result<Self> {
        config.validate()?;
        let tz = config.tz()?;

        let classifier = CategoryClassifier::from_config(config.classification.clone())?;
        let table = classifier.table().clone();

        Ok(Self {
            tz,
            collector: SourceCollector::new(config.collection.clone()),
            windows: WeekendWindowCalculator::new(tz, WeekendDays::from(&config.window)),
            locations: LocationManager::default(),
            classifier,
            deduplicator: Deduplicator::new(config.dedup.clone(), table),
            serializer: CalendarSerializer::new(config.calendar.clone(), tz),
            observer: Arc::new(NoopObserver),
            registry,
            config,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Make a semantic oracle available to classification and deduplication.
    pub fn with_oracle(mut self, oracle: Arc<dyn SemanticOracle>) -> Self {
        self.classifier = self.classifier.with_oracle(oracle.clone());
        self.deduplicator = self.deduplicator.with_oracle(oracle);
        self
    }

    pub fn with_locations(mut self, locations: LocationManager) -> Self {
        self.locations = locations;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn serializer(&self) -> &CalendarSerializer {
        &self.serializer
    }

    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Cancellation for a run starting now: fires at the deadline or on `cancel()`.
    pub fn cancel_signal(&self) -> (CancelSignal, CancelTrigger) {
        CancelSignal::with_trigger(Instant::now() + self.config.collection.deadline())
    }

    /// Run for the weekend around `reference` with the configured deadline.
    pub async fn run(&mut self, reference: NaiveDate) -> Result<RunReport> {
        let (cancel, _trigger) = self.cancel_signal();
        self.run_until(reference, cancel).await
    }

    pub async fn run_until(&mut self, reference: NaiveDate, cancel: CancelSignal) -> Result<RunReport> {
        self.observer.collection_started(self.registry.len());
        let collection = self.collector.collect_until(&self.registry, cancel).await;
        self.process(reference, collection)
    }

    /// Everything after collection. Single-threaded over the collected set.
    pub fn process(&mut self, reference: NaiveDate, collection: CollectionResult) -> Result<RunReport> {
        let window = self.windows.window_for_date(reference)?;
        let resolver = DateTimeResolver::new(self.tz, reference);
        let mut stats = RunStats::default();

        for report in &collection.reports {
            self.observer.source_finished(report);
            match report.status {
                SourceStatus::Success | SourceStatus::SuccessAfterRetry { .. } => {
                    stats.sources_succeeded += 1
                }
                SourceStatus::Cancelled => stats.sources_cancelled += 1,
                _ => stats.sources_failed += 1,
            }
        }

        let mut normalized = Vec::new();
        for collected in &collection.batches {
            let mut context = collected.batch.context.clone();
            if context.period.is_none() {
                context.period = context
                    .period_text
                    .as_deref()
                    .and_then(|text| resolver.parse_period(text));
            }

            for raw in &collected.batch.events {
                stats.collected += 1;
                let resolved = match resolver.resolve(
                    raw.date_text.as_deref(),
                    raw.time_text.as_deref(),
                    &context,
                ) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        stats.unresolved += 1;
                        self.observer.event_discarded(raw, &e.to_string());
                        continue;
                    }
                };

                if !window.contains(&resolved.at) {
                    stats.outside_window += 1;
                    self.observer.event_discarded(raw, "outside weekend window");
                    continue;
                }

                let category = self.classifier.classify_in_context(
                    &raw.name,
                    raw.category.as_deref(),
                    context.category_hint.as_deref(),
                );
                self.observer.event_classified(raw, &category);
                *stats
                    .classified
                    .entry(category.provenance.as_str().to_string())
                    .or_default() += 1;

                normalized.push(self.normalize(raw, resolved, category));
            }
        }

        stats.learned_mappings = self.classifier.learned_count();
        if let Err(e) = self.classifier.flush() {
            self.observer.persistence_failed(&e);
        }

        let (survivors, dedup) = self.deduplicator.dedup(normalized);
        for cluster in &dedup.clusters {
            self.observer.cluster_merged(cluster);
        }
        stats.merged = dedup.merged();

        let artifact = self.serializer.build(&survivors);
        for entry in &artifact.suppressed {
            self.observer.entry_suppressed(entry);
        }
        stats.emitted = artifact.entries.len();
        stats.suppressed = artifact.suppressed.len();

        self.observer.run_finished(&stats);

        let outcome = if artifact.is_empty() {
            RunOutcome::NoEvents
        } else {
            RunOutcome::Calendar(artifact)
        };

        Ok(RunReport {
            outcome,
            window,
            stats,
            collection,
            dedup,
        })
    }

    fn normalize(
        &self,
        raw: &RawEvent,
        resolved: crate::datetime::ResolvedTime,
        category: crate::CategoryResolution,
    ) -> NormalizedEvent {
        let mut links: Vec<String> = raw
            .streaming_links
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        links.sort();
        links.dedup();

        NormalizedEvent {
            id: NormalizedEvent::content_id(&raw.source, &raw.name, &resolved.at, &category.code),
            raw: raw.clone(),
            start: resolved.at,
            time_explicit: resolved.time_explicit,
            from_context: resolved.from_context,
            location: self.locations.resolve(&raw.location),
            category,
            streaming_links: links,
            sources: vec![raw.source.clone()],
        }
    }
}
