//! RelWatch - upstream release monitoring daemon
//!
//! CLI entry point for running checks and managing the daemon.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{error, info, warn};

use projectstore::{NewProject, ProjectStore, SqliteStore};
use relwatch::checker::Checker;
use relwatch::cli::{Cli, Command, OutputFormat, ProjectCommand};
use relwatch::config::Config;
use relwatch::daemon::DaemonManager;
use relwatch::fetcher::FetcherRegistry;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relwatch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("relwatch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    match cli.command {
        Command::Check => cmd_check(&config).await,
        Command::Start { foreground } => cmd_start(&config, foreground).await,
        Command::Stop => cmd_stop(),
        Command::Status { format } => cmd_status(&config, format),
        Command::Project { command } => cmd_project(&config, command),
        Command::RunDaemon => cmd_run_daemon(&config).await,
    }
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.storage.database_path).with_context(|| {
        format!(
            "Failed to open project store at {}",
            config.storage.database_path.display()
        )
    })?;
    Ok(Arc::new(store))
}

/// Release fetchers known to this build
///
/// Deployments that embed relwatch as a library register their site adapters
/// here; projects on unregistered backends fail their checks and surface in
/// the run counters.
fn build_registry() -> FetcherRegistry {
    FetcherRegistry::new()
}

fn new_checker(config: &Config) -> Result<Checker> {
    let store = open_store(config)?;
    let registry = build_registry();
    if registry.is_empty() {
        warn!("no release fetchers registered; checks will fail until backends are registered");
    } else {
        info!(backends = ?registry.backends(), "release fetchers registered");
    }
    Ok(Checker::new(config.checker.clone(), store, Arc::new(registry)))
}

/// Run a single check pass in the foreground
async fn cmd_check(config: &Config) -> Result<()> {
    let checker = new_checker(config)?;
    match checker.run().await? {
        Some(run) => println!(
            "Checked {} projects: {} ok, {} failed, {} rate limited",
            run.total_count, run.success_count, run.error_count, run.ratelimit_count
        ),
        None => println!("No projects due"),
    }
    Ok(())
}

/// Start the daemon
async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    let daemon = DaemonManager::new();

    if let Some(pid) = daemon.running_pid() {
        println!("RelWatch is already running (PID: {pid})");
        return Ok(());
    }

    if foreground {
        println!("Starting RelWatch in foreground mode...");
        run_daemon(config).await
    } else {
        let pid = daemon.start()?;
        println!("RelWatch started (PID: {pid})");
        Ok(())
    }
}

/// Stop the daemon
fn cmd_stop() -> Result<()> {
    DaemonManager::new().stop()?;
    println!("RelWatch stopped");
    Ok(())
}

/// Show daemon status, project count, and recent runs
fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let status = DaemonManager::new().status();
    let store = open_store(config)?;
    let projects = store.project_count()?;
    let runs = store.list_runs(5)?;

    match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "projects": projects,
                "recent_runs": runs,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Text => {
            match status.pid {
                Some(pid) => println!("Daemon: running (PID {pid})"),
                None => println!("Daemon: not running"),
            }
            println!("Projects tracked: {projects}");
            if runs.is_empty() {
                println!("No runs recorded yet");
            } else {
                println!("Recent runs:");
                for run in runs {
                    println!(
                        "  {}  total {:>5}  ok {:>5}  failed {:>5}  rate limited {:>5}",
                        run.created_on.format("%Y-%m-%d %H:%M:%S"),
                        run.total_count,
                        run.success_count,
                        run.error_count,
                        run.ratelimit_count
                    );
                }
            }
        }
    }
    Ok(())
}

/// Manage tracked projects
fn cmd_project(config: &Config, command: ProjectCommand) -> Result<()> {
    let store = open_store(config)?;

    match command {
        ProjectCommand::Add { name, backend } => {
            let project = store.create_project(NewProject::new(name, backend))?;
            println!(
                "Tracking {} (id {}, backend {})",
                project.name, project.id, project.backend
            );
        }
        ProjectCommand::List { format } => {
            let projects = store.list_projects()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&projects)?),
                OutputFormat::Text => {
                    if projects.is_empty() {
                        println!("No projects tracked");
                    }
                    for project in projects {
                        println!(
                            "{:>6}  {:<32} {:<16} next check {}",
                            project.id,
                            project.name,
                            project.backend,
                            project.next_check.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

/// Run as the daemon process (invoked via the hidden `run-daemon` command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    DaemonManager::new().register_self()?;
    run_daemon(config).await
}

/// The scheduler loop: one long-lived checker, one run per interval tick
///
/// The checker (and with it the rate-limit tracker) lives for the whole
/// process, so work deferred behind a backend block in one run is replayed
/// by a later one. Each run is awaited before the next tick fires, so runs
/// never overlap.
async fn run_daemon(config: &Config) -> Result<()> {
    let checker = new_checker(config)?;

    let mut interval = tokio::time::interval(Duration::from_secs(config.checker.run_interval_seconds));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        interval_secs = config.checker.run_interval_seconds,
        version = relwatch::daemon::VERSION,
        "RelWatch daemon started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = checker.run().await {
                    error!(%err, "check run failed");
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!(%err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
