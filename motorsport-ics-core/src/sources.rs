pub mod base;
pub mod feed;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::watch, time::Instant};

use crate::{Error, PageContext, RawEvent, Result};

pub use base::*;
pub use feed::FeedSource;

/// Cooperative cancellation: fires at the collection deadline or when triggered externally.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    deadline: Instant,
    trigger: Option<watch::Receiver<bool>>,
}

/// Handle that cancels every [`CancelSignal`] cloned from its pair.
#[derive(Debug)]
pub struct CancelTrigger(watch::Sender<bool>);

impl CancelTrigger {
    pub fn cancel(&self) {
        // No receivers left means nothing to cancel
        let _ = self.0.send(true);
    }
}

impl CancelSignal {
    pub fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            trigger: None,
        }
    }

    /// A signal that can also be fired before the deadline.
    pub fn with_trigger(deadline: Instant) -> (Self, CancelTrigger) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline,
                trigger: Some(rx),
            },
            CancelTrigger(tx),
        )
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        Instant::now() >= self.deadline
            || self.trigger.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// `Err(Error::Cancelled)` once the signal has fired. Sources call this at I/O boundaries.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the signal fires.
    pub async fn cancelled(&self) {
        let mut trigger = self.trigger.clone();
        let triggered = async {
            match trigger.as_mut() {
                Some(rx) => loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => {}
            _ = triggered => {}
        }
    }
}

/// Per-attempt information handed to a source.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// 1-based attempt number
    pub attempt: u32,
    /// Timeout the collector enforces on this attempt
    pub timeout: Duration,
    pub cancel: CancelSignal,
}

/// Events extracted from one source, in extraction order, plus the page context around them.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub events: Vec<RawEvent>,
    pub context: PageContext,
}

/// An event listing the collector can fetch from.
#[async_trait]
pub trait Source: Send + Sync {
    /// Unique source name
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Higher priority wins representative election during deduplication
    fn priority(&self) -> u32;

    /// Per-attempt timeout overriding the collector default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Fetch one batch.
    ///
    /// Implementations should call `ctx.cancel.check()` between I/O steps and
    /// return transient errors (`Error::Timeout`, connection failures) only for
    /// failures worth retrying.
    async fn fetch(&self, ctx: &FetchContext) -> Result<SourceBatch>;
}

/// Registered sources, in registration order.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, replacing any previous source with the same name.
    pub fn register(&mut self, source: Arc<dyn Source>) {
        match self.sources.iter().position(|s| s.name() == source.name()) {
            Some(idx) => self.sources[idx] = source,
            None => self.sources.push(source),
        }
    }

    pub fn get_source(&self, name: &str) -> Option<Arc<dyn Source>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    /// (name, description, priority) of every source.
    pub fn list_sources(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.sources
            .iter()
            .map(|s| (s.name(), s.description(), s.priority()))
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
