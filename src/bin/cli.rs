//! judsync CLI
//!
//! Local entry point composing the file-backed storage, the source
//! adapters and the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use judsync::{
    error::{AppError, Result},
    models::{Config, SyncRun, TenantScope},
    pipeline::{self, DailyOutcome, SyncOrchestrator},
    services::{ContentClassifier, DeadlineEngine, EventService, RecordProcessor},
    sources::{DatajudAdapter, DjenAdapter, SourceAdapter},
    storage::{LocalStorage, SyncStateStore},
    utils::{Clock, SystemClock},
};

/// judsync - Judicial Publication Sync
#[derive(Parser, Debug)]
#[command(
    name = "judsync",
    version,
    about = "Ingests judicial publications and derives deadlines"
)]
struct Cli {
    /// Path to storage directory containing config.toml, cases.json and state
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Organization the command acts for
    #[arg(long, default_value = "default")]
    org: String,

    /// Restrict case lookups to one office
    #[arg(long)]
    office: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PullSource {
    Datajud,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BundleSource {
    Djen,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull new movements of one tracked case
    SyncCase {
        /// Tracked case id
        case_id: String,

        #[arg(long, value_enum, default_value = "datajud")]
        source: PullSource,
    },

    /// Pull new movements of every monitored case
    SyncAll {
        #[arg(long, value_enum, default_value = "datajud")]
        source: PullSource,
    },

    /// Ingest one day of the gazette bundle
    SyncDaily {
        /// Publication date (YYYY-MM-DD), today by default
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, value_enum, default_value = "djen")]
        source: BundleSource,
    },

    /// Import normalized records from a JSON file
    Ingest {
        /// JSON array of normalized records
        file: PathBuf,
    },

    /// List open events with their current urgency
    Events,

    /// Validate configuration files
    Validate,

    /// Show storage info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, default_level: &str) {
    let level = if verbose { "debug" } else { default_level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Settle on a configuration (defaults when the file is unusable) and
/// reject it before any command runs on it.
fn prepare_config(loaded: Result<Config>, path: &Path) -> Result<Config> {
    let config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", path.display());
            config
        }
        Err(_) => Config::load_or_default(path),
    };
    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }
    Ok(config)
}

fn pull_adapter(source: PullSource, config: &Config) -> Result<Box<dyn SourceAdapter>> {
    match source {
        PullSource::Datajud => Ok(Box::new(DatajudAdapter::new(config)?)),
    }
}

fn bundle_adapter(source: BundleSource, config: &Config) -> Result<Box<dyn SourceAdapter>> {
    match source {
        BundleSource::Djen => Ok(Box::new(DjenAdapter::new(config)?)),
    }
}

fn report(run: &SyncRun) {
    log::info!(
        "Run {}: {} (found {}, imported {}, duplicates {}, errors {})",
        run.id,
        run.status.as_str(),
        run.found,
        run.imported,
        run.duplicates,
        run.errors
    );
    for line in &run.error_log {
        log::warn!("  {}", line);
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let loaded = Config::load(&config_path);
    let default_level = loaded
        .as_ref()
        .map_or_else(|_| "info".to_string(), |c| c.logging.level.clone());
    init_logging(cli.verbose, &default_level);

    let config = prepare_config(loaded, &config_path)?;

    let mut scope = TenantScope::org(&cli.org);
    if let Some(office) = &cli.office {
        scope = scope.with_office(office);
    }

    let storage = Arc::new(
        LocalStorage::open(&cli.storage_dir, config.rules.clone(), config.filters.clone()).await?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let processor = Arc::new(
        RecordProcessor::new(storage.clone(), storage.clone(), storage.clone(), clock.clone())
            .with_classifier(ContentClassifier::new(&config.classifier))
            .with_deadline_engine(DeadlineEngine::new(&config.deadlines)),
    );
    let orchestrator = SyncOrchestrator::new(
        processor.clone(),
        storage.clone(),
        storage.clone(),
        clock.clone(),
    )
    .with_max_concurrent(config.sync.max_concurrent)
    .with_cursor_overlap(config.sync.cursor_overlap());

    match cli.command {
        Command::SyncCase { case_id, source } => {
            let adapter = pull_adapter(source, &config)?;
            let run = orchestrator
                .sync_case(&scope, &case_id, adapter.as_ref())
                .await?;
            report(&run);
        }

        Command::SyncAll { source } => {
            let adapter = pull_adapter(source, &config)?;
            let runs = orchestrator.sync_all_cases(&scope, adapter.as_ref()).await?;
            for run in &runs {
                report(run);
            }
        }

        Command::SyncDaily { date, source } => {
            let adapter = bundle_adapter(source, &config)?;
            let date = date.unwrap_or_else(|| clock.today());
            match orchestrator
                .sync_daily(&scope, date, adapter.as_ref())
                .await?
            {
                DailyOutcome::AlreadySynced(run) => {
                    log::info!("{} was already synced by run {}", date, run.id);
                }
                DailyOutcome::Ran(run) => report(&run),
            }
        }

        Command::Ingest { file } => {
            let records = pipeline::load_records(&file).await?;
            log::info!("Loaded {} record(s) from {}", records.len(), file.display());
            let summary = pipeline::run_ingest(&processor, &scope, &records).await;
            if summary.errors > 0 {
                return Err(AppError::validation(format!(
                    "{} record(s) failed to ingest",
                    summary.errors
                )));
            }
        }

        Command::Events => {
            let events = EventService::new(storage.clone(), clock.clone());
            let open = events.list_open(&scope.org_id).await?;
            if open.is_empty() {
                log::info!("No open events.");
            }
            for view in open {
                let event = &view.event;
                log::info!(
                    "[{}] {} {} case={} due={} ({})",
                    event.urgency,
                    event.id,
                    event.event_type,
                    event.case_id.as_deref().unwrap_or("-"),
                    view.deadline
                        .as_ref()
                        .map_or_else(|| "-".to_string(), |d| d.due_on.to_string()),
                    event.status
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            // The file itself must parse; the defaults fallback does not count.
            Config::load(&config_path)?;
            log::info!(
                "✓ Config OK ({} keyword groups, {} rules, {} filters)",
                config.classifier.groups.len(),
                config.rules.len(),
                config.filters.len()
            );
            log::info!("✓ {} tracked case(s) loaded", storage.cases().len());

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", storage.root_dir().display());
            log::info!("Tracked cases: {}", storage.cases().len());

            let (publications, events, deadlines) = storage.counts().await;
            log::info!(
                "Publications: {}, events: {}, deadlines: {}",
                publications,
                events,
                deadlines
            );

            let runs = storage.list_runs(&scope.org_id).await?;
            match runs.iter().max_by_key(|r| r.started_at) {
                Some(last) => log::info!(
                    "Last run: {} {} on {} -> {}",
                    last.key.source,
                    last.key.case_id.as_deref().unwrap_or("daily"),
                    last.key.run_date,
                    last.status.as_str()
                ),
                None => log::info!("No sync runs yet."),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
