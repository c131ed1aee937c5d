use std::sync::Arc;

use anyhow::{Context, Result};
use motorsport_ics_core::{
    config::PipelineConfig,
    sources::{FeedSource, SourceRegistry},
};

/// Register one feed source per configured entry, in configuration order.
pub(crate) fn from_config(config: &PipelineConfig) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();
    for source in &config.sources {
        let feed = FeedSource::from_config(source)
            .with_context(|| format!("Cannot set up source {}", source.name))?;
        tracing::debug!(source = %source.name, url = %feed.url(), "Registered source");
        registry.register(Arc::new(feed));
    }
    Ok(registry)
}
