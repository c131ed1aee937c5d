mod commands;
mod registry;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "motorsport-ics")]
#[command(about = "Motorsport weekend calendar generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Ics,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect every configured source and write the weekend calendar
    Generate {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Reference date (YYYY-MM-DD), defaults to today in the configured timezone
        #[arg(short, long)]
        date: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "ics")]
        format: OutputFormat,
    },

    /// List the configured sources
    Sources {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Classify a session name
    Classify {
        /// Session name ("F1 - Qualifying")
        name: String,

        /// Category as printed next to the event
        #[arg(long)]
        hint: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the weekend window around a date
    Window {
        /// Reference date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Resolve free-text date and time fragments
    Resolve {
        /// Date fragment ("02/08/2025", "2 de agosto")
        date: String,

        /// Time fragment ("às 14h30")
        time: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Venue normalization
    Location {
        #[command(subcommand)]
        action: LocationCommands,
    },
}

#[derive(Subcommand)]
enum LocationCommands {
    /// List known venues
    List,

    /// Normalize a venue name
    Resolve {
        location: String,
    },

    /// Export the venue table to a JSON file
    Export {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("motorsport_ics={0},motorsport_ics_core={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Generate {
            config,
            date,
            output,
            format,
        } => {
            commands::generate_command(commands::GenerateParams {
                config,
                date,
                output,
                format,
            })
            .await
        }

        Commands::Sources { config } => commands::sources_command(config),

        Commands::Classify { name, hint, config } => commands::classify_command(name, hint, config),

        Commands::Window { date, config } => commands::window_command(date, config),

        Commands::Resolve { date, time, config } => commands::resolve_command(date, time, config),

        Commands::Location { action } => match action {
            LocationCommands::List => commands::location_list_command(),
            LocationCommands::Resolve { location } => commands::location_resolve_command(location),
            LocationCommands::Export { file } => commands::location_export_command(file),
        },
    }
}
