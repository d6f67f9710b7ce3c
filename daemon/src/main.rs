//! `imageset-sync` daemon.
//!
//! Runs the periodic sync loop against a Git repository, or a single cycle
//! with `--once`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use imageset_sync::config::{load_settings, DEFAULT_SETTINGS_FILE};
use imageset_sync::db::{default_database_path, Database, SqliteImageSetStore};
use imageset_sync::sanitize::{redact_path, redact_repo_url};
use imageset_sync::secrets::expand_home;
use imageset_sync::{
    CycleEvent, CyclePhase, FileSettingsProvider, GitSource, ImageSetController, ImageSetStore,
    MemoryStore, SyncScheduler, SyncSettings,
};

#[derive(Parser)]
#[command(name = "imageset-sync")]
#[command(about = "Sync ClusterImageSet records from a Git repository", version)]
struct Cli {
    /// Settings file, re-read at the start of every cycle
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Override syncInterval (seconds)
    #[arg(short = 'i', long)]
    sync_interval: Option<u64>,

    /// Persist records in SQLite at the default data path when the settings
    /// file does not name one
    #[arg(long)]
    persist: bool,

    /// Run a single cycle, print its report as JSON and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.json_logs) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting imageset-sync v{}", env!("CARGO_PKG_VERSION"));

    // Fail fast on an unreadable settings file; later cycles re-read it.
    let settings = match load_settings(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Syncing {} branch {} path {}/{} from {}",
        redact_repo_url(&settings.git_repo_url),
        settings.git_repo_branch,
        settings.git_repo_path,
        settings.channel,
        redact_path(&cli.config)
    );

    let store = match open_store(&settings, cli.persist) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let controller = ImageSetController::new(
        Arc::new(FileSettingsProvider::new(&cli.config)),
        Arc::new(GitSource::new()),
        store,
    );

    if cli.once {
        return run_once(controller);
    }

    let interval = Duration::from_secs(cli.sync_interval.unwrap_or(settings.sync_interval).max(1));
    run_daemon(controller, interval)
}

fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let subscriber = tracing_subscriber::registry().with(fmt_layer).with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    // The library logs through `log`; forward it into tracing.
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn open_store(
    settings: &SyncSettings,
    persist: bool,
) -> Result<Arc<dyn ImageSetStore>, imageset_sync::DatabaseError> {
    let path = match &settings.store.database_path {
        Some(path) => Some(expand_home(&path.to_string_lossy())),
        None if persist => default_database_path(),
        None => None,
    };

    match path {
        Some(path) => {
            info!("Using SQLite store at {}", redact_path(&path));
            Ok(Arc::new(SqliteImageSetStore::new(Database::open(&path)?)))
        }
        None => {
            if persist {
                warn!("Could not determine a data directory, using the in-memory store");
            } else {
                info!("Using the in-memory store");
            }
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn run_once(mut controller: ImageSetController) -> ExitCode {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(controller.run_cycle(CyclePhase::AwaitingFirstSync)) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("Sync failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_daemon(controller: ImageSetController, interval: Duration) -> ExitCode {
    let scheduler = Arc::new(SyncScheduler::new(interval));
    let mut events = scheduler.subscribe();

    let handler_scheduler = Arc::clone(&scheduler);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested");
        handler_scheduler.stop();
    }) {
        error!("Failed to install signal handler: {}", e);
        return ExitCode::FAILURE;
    }

    let handle = match scheduler.start(controller) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start scheduler thread: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Sync scheduler started, interval {}s", interval.as_secs());

    // Detached: it blocks on the event channel until the process exits.
    let spawned = std::thread::Builder::new()
        .name("imageset-sync-events".to_string())
        .spawn(move || loop {
            match events.blocking_recv() {
                Ok(CycleEvent::Completed(report)) if report.skipped => {
                    log::debug!("Branch head unchanged, cycle skipped");
                }
                Ok(CycleEvent::Completed(report)) => {
                    info!(
                        "Cycle complete ({:?}): {} created, {} updated, {} deleted",
                        report.phase,
                        report.created.len(),
                        report.updated.len(),
                        report.deleted().len()
                    );
                }
                Ok(CycleEvent::Failed {
                    phase, retryable, ..
                }) => {
                    warn!(
                        "Cycle failed ({:?}), {}",
                        phase,
                        if retryable {
                            "retrying next interval"
                        } else {
                            "check the settings and repository contents"
                        }
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} cycle event(s)", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start event logger: {}", e);
    }

    if handle.join().is_err() {
        error!("Sync scheduler thread panicked");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
