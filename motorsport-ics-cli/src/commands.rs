use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat};
use motorsport_ics_core::{
    PageContext,
    category::CategoryClassifier,
    config::PipelineConfig,
    datetime::DateTimeResolver,
    location::LocationManager,
    observer::TracingObserver,
    pipeline::{Pipeline, RunOutcome},
    window::{WeekendDays, WeekendWindowCalculator},
};

use crate::{OutputFormat, registry};

/// Generate command parameters
pub struct GenerateParams {
    pub config: PathBuf,
    pub date: Option<String>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn reference_date(date: Option<&str>, config: &PipelineConfig) -> Result<NaiveDate> {
    match date {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date)),
        None => Ok(chrono::Utc::now().with_timezone(&config.tz()?).date_naive()),
    }
}

/// Collect, consolidate and write the weekend calendar.
pub async fn generate_command(params: GenerateParams) -> Result<()> {
    let config = load_config(Some(&params.config))?;
    let reference = reference_date(params.date.as_deref(), &config)?;
    let registry = registry::from_config(&config)?;

    tracing::info!(
        sources = registry.len(),
        reference = %reference,
        "Generating weekend calendar"
    );

    let mut pipeline = Pipeline::new(config, registry)?.with_observer(Arc::new(TracingObserver));

    let (cancel, trigger) = pipeline.cancel_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling collection");
            trigger.cancel();
        }
    });

    let report = pipeline.run_until(reference, cancel).await;
    interrupt.abort();
    let report = report?;

    println!(
        "Weekend {} → {}",
        report.window.start.date_naive(),
        report.window.end.date_naive()
    );
    for source in &report.collection.reports {
        println!(
            "  {:<20} {:<28} {} events",
            source.source,
            source.status.label(),
            source.events
        );
    }

    let artifact = match report.outcome {
        RunOutcome::Calendar(artifact) => artifact,
        RunOutcome::NoEvents => {
            println!("No events found for this weekend, nothing written");
            return Ok(());
        }
    };

    let (content, extension) = match params.format {
        OutputFormat::Ics => (pipeline.serializer().render(&artifact), "ics"),
        OutputFormat::Json => (pipeline.serializer().render_json(&artifact)?, "json"),
    };

    let output = params.output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "motorsport-weekend-{}.{}",
            report.window.start.date_naive(),
            extension
        ))
    });
    fs::write(&output, content)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let stats = &report.stats;
    println!(
        "✓ {} entries ({} merged, {} hidden, {} outside the weekend, {} unresolved)",
        stats.emitted, stats.merged, stats.suppressed, stats.outside_window, stats.unresolved
    );
    println!("✓ Calendar written to {}", output.display());

    Ok(())
}

/// List configured sources.
pub fn sources_command(config: PathBuf) -> Result<()> {
    let config = load_config(Some(&config))?;
    let registry = registry::from_config(&config)?;

    println!("Configured sources:");
    if registry.is_empty() {
        println!("  (none)");
    }
    for (name, description, priority) in registry.list_sources() {
        println!("  {} [priority {}] - {}", name, priority, description);
    }

    Ok(())
}

pub fn classify_command(name: String, hint: Option<String>, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let mut classifier = CategoryClassifier::from_config(config.classification)?;

    let resolution = classifier.classify(&name, hint.as_deref());
    println!("Name:       {}", name);
    println!("Category:   {} ({})", resolution.code, resolution.label);
    println!("Confidence: {:.2}", resolution.confidence);
    println!("Provenance: {}", resolution.provenance.as_str());

    if let Err(e) = classifier.flush() {
        tracing::warn!(error = %e, "Learned mappings not saved");
    }
    Ok(())
}

pub fn window_command(date: Option<String>, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let reference = reference_date(date.as_deref(), &config)?;
    let calculator = WeekendWindowCalculator::new(config.tz()?, WeekendDays::from(&config.window));
    let window = calculator.window_for_date(reference)?;

    println!("Reference: {}", reference);
    println!("Start:     {}", window.start.to_rfc3339_opts(SecondsFormat::Secs, false));
    println!("End:       {}", window.end.to_rfc3339_opts(SecondsFormat::Millis, false));
    let days: Vec<String> = window
        .days()
        .iter()
        .map(|d| d.format("%a %d/%m").to_string())
        .collect();
    println!("Days:      {}", days.join(", "));

    Ok(())
}

pub fn resolve_command(date: String, time: Option<String>, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let tz = config.tz()?;
    let reference = reference_date(None, &config)?;
    let resolver = DateTimeResolver::new(tz, reference);

    let resolved = resolver.resolve(Some(&date), time.as_deref(), &PageContext::default())?;
    println!("{}", resolved.at.to_rfc3339_opts(SecondsFormat::Secs, false));
    if !resolved.time_explicit {
        println!("(no time given, midnight assumed)");
    }

    Ok(())
}

pub fn location_list_command() -> Result<()> {
    let manager = LocationManager::default();

    println!("Known venues:");
    for venue in manager.get_all_mappings() {
        match venue.country {
            Some(ref country) => println!("  {} ({})", venue.name, country),
            None => println!("  {}", venue.name),
        }
        if !venue.aliases.is_empty() {
            println!("    aliases: {}", venue.aliases.join(", "));
        }
    }

    Ok(())
}

pub fn location_resolve_command(location: String) -> Result<()> {
    let manager = LocationManager::default();
    let resolved = manager.resolve(&location);

    println!("Original: {}", location);
    println!("Venue:    {}", resolved.name);
    if let Some(ref country) = resolved.country {
        println!("Country:  {}", country);
    }

    Ok(())
}

pub fn location_export_command(file: PathBuf) -> Result<()> {
    let manager = LocationManager::default();
    let json = manager.export_to_json()?;

    fs::write(&file, json).with_context(|| format!("Failed to write {}", file.display()))?;
    println!("✓ Venue table exported to {}", file.display());

    Ok(())
}
