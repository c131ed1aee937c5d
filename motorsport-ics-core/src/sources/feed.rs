use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    ContextPeriod, PageContext, RawEvent, Result,
    config::SourceConfig,
    sources::{BaseSource, BaseSourceBuilder, FetchContext, Source, SourceBatch, SourceInfo},
};

/// Page published by an upstream extractor.
#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    period: Option<ContextPeriod>,
    #[serde(default)]
    period_text: Option<String>,
    #[serde(default)]
    category_hint: Option<String>,
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    Page(FeedPage),
    Events(Vec<RawEvent>),
}

/// Source reading already-extracted events from a JSON feed.
///
/// Accepts either a bare list of events or a page object carrying the
/// programming period and section category next to the events.
pub struct FeedSource {
    base: BaseSource,
    url: String,
    timeout: Option<Duration>,
}

impl FeedSource {
    pub fn new(name: &str, url: &str, priority: u32) -> Result<Self> {
        let base = BaseSourceBuilder::new(SourceInfo {
            name: name.to_string(),
            description: format!("JSON feed {}", url),
            priority,
        })
        .build()?;
        Ok(Self {
            base,
            url: url.to_string(),
            timeout: None,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let timeout = config.timeout_secs.map(Duration::from_secs);
        let info = SourceInfo {
            name: config.name.clone(),
            description: config
                .description
                .clone()
                .unwrap_or_else(|| format!("JSON feed {}", config.url)),
            priority: config.priority,
        };
        let builder = match timeout {
            Some(t) => BaseSourceBuilder::new_with_timeout(info, t),
            None => BaseSourceBuilder::new(info),
        };
        Ok(Self {
            base: builder.build()?,
            url: config.url.clone(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Source for FeedSource {
    fn name(&self) -> &str {
        &self.base.info.name
    }

    fn description(&self) -> &str {
        &self.base.info.description
    }

    fn priority(&self) -> u32 {
        self.base.info.priority
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<SourceBatch> {
        let document: FeedDocument = self.base.get_json(&self.url, ctx).await?;
        let (events, context) = match document {
            FeedDocument::Page(page) => (
                page.events,
                PageContext {
                    period: page.period,
                    category_hint: page.category_hint,
                    period_text: page.period_text,
                },
            ),
            FeedDocument::Events(events) => (events, PageContext::default()),
        };

        let events = events
            .into_iter()
            .map(|mut event| {
                event.source = self.base.info.name.clone();
                event.priority = self.base.info.priority;
                event
            })
            .collect::<Vec<_>>();

        tracing::debug!(source = %self.base.info.name, events = events.len(), "Feed parsed");
        Ok(SourceBatch { events, context })
    }
}
