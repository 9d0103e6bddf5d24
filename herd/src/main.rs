//! GitHerd - branch reconciliation daemon
//!
//! CLI entry point for polling, inspecting and steering repositories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail, eyre};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use githerd::cli::{Cli, Command, OutputFormat, RepoCommand, get_log_path};
use githerd::config::{Config, RepoConfig};
use githerd::events::{EventBus, EventLogger, HerdEvent, read_all_events, read_repo_events, spawn_event_logger};
use githerd::git::{GitCli, GitClient, remote_ref};
use githerd::lock;
use githerd::reconcile::{CycleReport, Outcome, Reconciler, Trigger};
use githerd::scheduler::{Scheduler, SchedulerConfig};
use herdstore::{Health, JsonStore, Settings, SettingsStore, repo_key};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let app = App::open(config)?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { repos } => cmd_run(&app, repos).await,
        Command::Status { path, format } => cmd_status(&app, path, format).await,
        Command::Sync { path } => cmd_cycle(&app, path, Trigger::Manual).await,
        Command::Merge { path } => cmd_cycle(&app, path, Trigger::MergeConfirmed).await,
        Command::Branches { path } => cmd_branches(&app, path).await,
        Command::Enable { path, branch } => cmd_toggle(&app, &path, &branch, true),
        Command::Disable { path, branch } => cmd_toggle(&app, &path, &branch, false),
        Command::DeleteBranch { path, branch, yes } => cmd_delete_branch(&app, &path, &branch, yes).await,
        Command::Repo { command } => cmd_repo(&app, command).await,
        Command::Logs { path, lines } => cmd_logs(&app, path, lines),
    }
}

/// Shared handles for one invocation
struct App {
    config: Config,
    git: Arc<GitCli>,
    store: Arc<JsonStore>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let settings_path = config.settings_path();
        let store = JsonStore::open(&settings_path)
            .with_context(|| format!("Failed to open settings store {}", settings_path.display()))?;
        let git = GitCli::new(&config.git.binary, config.command_timeout());
        Ok(Self {
            config,
            git: Arc::new(git),
            store: Arc::new(store),
        })
    }

    /// Reconciler with its event logger running
    ///
    /// Dropping the reconciler closes the bus, which ends the logger task.
    fn reconciler(&self) -> Result<(Arc<Reconciler>, JoinHandle<()>)> {
        let bus = Arc::new(EventBus::with_default_capacity());
        let logger = spawn_event_logger(&bus, self.config.events_dir()).context("Failed to start event logger")?;
        let reconciler = Reconciler::new(
            self.git.clone(),
            self.store.clone(),
            bus,
            self.config.sync.sync_new_branches_by_default,
        );
        Ok((Arc::new(reconciler), logger))
    }

    /// Validated config for a repository given on the command line
    async fn repo(&self, path: Option<PathBuf>) -> Result<RepoConfig> {
        let path = match path {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let path = absolute(&path)?;
        if !self.git.is_repository(&path).await.unwrap_or(false) {
            bail!("{} is not a git repository", path.display());
        }
        Ok(self.config.repo_config(&path)?)
    }

    fn log_event(&self, event: HerdEvent) {
        let mut logger = EventLogger::new(self.config.events_dir());
        if let Err(e) = logger.write_event(&event) {
            warn!(error = %e, "Failed to log event");
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Repository {} not found", path.display()))
}

async fn finish(reconciler: Arc<Reconciler>, logger: JoinHandle<()>) {
    drop(reconciler);
    if let Err(e) = logger.await {
        warn!(error = %e, "Event logger task failed");
    }
}

/// Poll every selected repository until Ctrl-C
async fn cmd_run(app: &App, repos: Vec<PathBuf>) -> Result<()> {
    debug!(?repos, "cmd_run: called");
    let paths = if repos.is_empty() {
        let hidden = app.store.hidden_repos()?;
        let mut paths = app.store.visible_repos()?;
        for path in app.config.repo_paths() {
            if !paths.contains(&path) && !hidden.contains(&path) {
                paths.push(path);
            }
        }
        paths
    } else {
        repos.iter().map(|p| absolute(p)).collect::<Result<Vec<_>>>()?
    };

    let mut configs = Vec::new();
    for path in paths {
        match app.config.repo_config(&path) {
            Ok(repo) => configs.push(repo),
            Err(e) => {
                warn!(repo = %path.display(), error = %e, "Skipping repository");
                eprintln!("{} {}: {}", "skipped".yellow(), path.display(), e);
            }
        }
    }
    if configs.is_empty() {
        bail!("No repositories to watch; add one with `githerd repo add PATH`");
    }

    let (reconciler, logger) = app.reconciler()?;
    let printer = tokio::spawn(print_reports(reconciler.bus().subscribe()));

    println!("Watching {} repositories (Ctrl-C to stop)", configs.len());
    for repo in &configs {
        println!("  {} every {}s", repo.path.display().to_string().cyan(), repo.interval_seconds);
    }

    let handle = Scheduler::spawn(reconciler.clone(), configs, SchedulerConfig::default());
    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;

    println!("Stopping after in-flight cycles...");
    handle.shutdown().await;
    finish(reconciler, logger).await;
    let _ = printer.await;
    Ok(())
}

async fn print_reports(mut rx: broadcast::Receiver<HerdEvent>) {
    loop {
        match rx.recv().await {
            Ok(HerdEvent::CycleFinished { report, .. }) => {
                if report.result.outcome != Outcome::NoOp {
                    print_report(&report);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(missed = n, "print_reports: lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn outcome_label(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::Applied => "applied".green(),
        Outcome::NoOp => "no-op".dimmed(),
        Outcome::AwaitingConfirmation => "awaiting confirmation".yellow(),
        Outcome::Stopped => "stopped".yellow(),
        Outcome::Failed { kind } => format!("failed ({})", kind).red(),
    }
}

fn health_label(health: Health) -> ColoredString {
    match health {
        Health::Ok => health.to_string().green(),
        Health::Errored => health.to_string().red(),
    }
}

fn print_report(report: &CycleReport) {
    println!(
        "{} {} [{}]",
        report.repo.display().to_string().cyan(),
        outcome_label(&report.result.outcome),
        report.trigger
    );
    println!("  classification: {}", report.classification);
    println!("  action:         {}", report.action);
    println!("  result:         {}", report.result.message);
    println!("  health:         {}", health_label(report.health));
}

async fn cmd_status(app: &App, path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    debug!(?path, %format, "cmd_status: called");
    let repo = app.repo(path).await?;
    let (reconciler, logger) = app.reconciler()?;
    let scan = reconciler.scan(&repo).await;
    finish(reconciler, logger).await;
    let scan = scan.with_context(|| format!("Failed to probe {}", repo.path.display()))?;
    let health = app.store.health(&repo.path)?.unwrap_or_default();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "repo": scan.config.path,
                "health": health,
                "main": scan.report.main,
                "branches": scan.report.branches,
                "classification": scan.classification,
                "action": scan.action,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{} [{}]", scan.config.path.display().to_string().cyan(), health_label(health));
            let main = &scan.report.main;
            println!(
                "  {}: {} ahead, {} behind {}/{}",
                scan.config.main_branch, main.local_ahead, main.local_behind, scan.config.remote, scan.config.main_branch
            );
            println!(
                "  tracked: {} ({} enabled)",
                scan.report.branches.len(),
                scan.report.enabled_branches().count()
            );
            println!("  classification: {}", scan.classification);
            let action = scan.action.to_string();
            if scan.action.is_automatic() {
                println!("  next action:    {}", action);
            } else {
                println!("  next action:    {}", action.yellow());
            }
        }
    }
    Ok(())
}

/// One cycle through the repository's worker queue
async fn cmd_cycle(app: &App, path: Option<PathBuf>, trigger: Trigger) -> Result<()> {
    debug!(?path, %trigger, "cmd_cycle: called");
    let repo = app.repo(path).await?;
    let (reconciler, logger) = app.reconciler()?;

    let config = SchedulerConfig {
        run_on_start: false,
        ..Default::default()
    };
    let handle = Scheduler::spawn(reconciler.clone(), vec![repo.clone()], config);
    let report = handle.trigger(&repo.path, trigger).await;
    handle.shutdown().await;
    finish(reconciler, logger).await;

    let report = report?;
    print_report(&report);
    if let Outcome::Failed { kind } = &report.result.outcome {
        return Err(eyre!("Cycle failed ({}): {}", kind, report.result.message));
    }
    Ok(())
}

async fn cmd_branches(app: &App, path: Option<PathBuf>) -> Result<()> {
    debug!(?path, "cmd_branches: called");
    let repo = app.repo(path).await?;
    let (reconciler, logger) = app.reconciler()?;
    let scan = reconciler.scan(&repo).await;
    finish(reconciler, logger).await;
    let scan = scan.with_context(|| format!("Failed to probe {}", repo.path.display()))?;

    if scan.report.branches.is_empty() {
        println!("No branches matching {}*", scan.config.branch_prefix);
        return Ok(());
    }

    let width = scan.report.branches.iter().map(|b| b.name.len()).max().unwrap_or(0);
    for branch in &scan.report.branches {
        let flag = if branch.enabled { "on".green() } else { "off".dimmed() };
        let position = match (branch.ahead, branch.behind) {
            (0, 0) => "at main".dimmed().to_string(),
            (ahead, 0) => format!("{} ahead", ahead),
            (0, behind) => format!("{} behind", behind),
            (ahead, behind) => format!("{} ahead, {} behind", ahead, behind).yellow().to_string(),
        };
        println!("  {:<width$}  {:<3}  {}", branch.name, flag, position, width = width);
    }
    Ok(())
}

fn cmd_toggle(app: &App, path: &Path, branch: &str, enabled: bool) -> Result<()> {
    debug!(path = %path.display(), %branch, enabled, "cmd_toggle: called");
    let path = absolute(path)?;
    app.store.set_branch_enabled(&path, branch, enabled)?;
    app.log_event(HerdEvent::BranchToggled {
        repo: path.display().to_string(),
        branch: branch.to_string(),
        enabled,
    });

    let state = if enabled { "enabled".green() } else { "disabled".yellow() };
    println!("{} {} {}", "✓".green(), branch.cyan(), state);
    Ok(())
}

async fn cmd_delete_branch(app: &App, path: &Path, branch: &str, yes: bool) -> Result<()> {
    debug!(path = %path.display(), %branch, yes, "cmd_delete_branch: called");
    let repo = app.repo(Some(path.to_path_buf())).await?.with_overlay()?;
    if branch == repo.main_branch {
        bail!("Refusing to delete {}", repo.main_branch);
    }
    if !yes {
        bail!("Deleting {}/{} cannot be undone; pass --yes to confirm", repo.remote, branch);
    }

    let _lock = lock::acquire(app.git.as_ref(), &repo.path).await?;
    app.git.fetch(&repo.path, &repo.remote).await?;
    if app.git.resolve_ref(&repo.path, &remote_ref(&repo.remote, branch)).await?.is_none() {
        bail!("{}/{} does not exist", repo.remote, branch);
    }
    app.git.delete_remote_branch(&repo.path, &repo.remote, branch).await?;

    let key = repo_key(&repo.path);
    app.store.update(&mut |settings: &mut Settings| {
        if let Some(flags) = settings.branch_enabled.get_mut(&key) {
            flags.remove(branch);
        }
    })?;
    app.log_event(HerdEvent::BranchDeleted {
        repo: repo.path.display().to_string(),
        branch: branch.to_string(),
    });

    println!("{} deleted {}/{}", "✓".green(), repo.remote, branch.cyan());
    Ok(())
}

async fn cmd_repo(app: &App, command: RepoCommand) -> Result<()> {
    debug!(?command, "cmd_repo: called");
    match command {
        RepoCommand::Add { path } => {
            let path = absolute(&path)?;
            if !app.git.is_repository(&path).await.unwrap_or(false) {
                bail!("{} is not a git repository", path.display());
            }
            if app.store.add_repo(&path)? {
                println!("{} added {}", "✓".green(), path.display());
            } else {
                println!("{} already added", path.display());
            }
        }
        RepoCommand::Remove { path } => {
            let path = absolute(&path).unwrap_or(path);
            if app.store.remove_repo(&path)? {
                println!("{} removed {}", "✓".green(), path.display());
            } else {
                println!("{} was not added", path.display());
            }
        }
        RepoCommand::Hide { path } => {
            app.store.set_hidden(&absolute(&path)?, true)?;
            println!("{} hidden {}", "✓".green(), path.display());
        }
        RepoCommand::Show { path } => {
            app.store.set_hidden(&absolute(&path)?, false)?;
            println!("{} showing {}", "✓".green(), path.display());
        }
        RepoCommand::Pause { path } => {
            app.store.set_polling(&absolute(&path)?, false)?;
            println!("{} paused {}", "✓".green(), path.display());
        }
        RepoCommand::Resume { path } => {
            app.store.set_polling(&absolute(&path)?, true)?;
            println!("{} resumed {}", "✓".green(), path.display());
        }
        RepoCommand::List => {
            let repos = app.store.repos()?;
            let hidden = app.store.hidden_repos()?;
            if repos.is_empty() {
                println!("No repositories");
            }
            for repo in &repos {
                let health = health_label(app.store.health(repo)?.unwrap_or_default());
                let mut notes = Vec::new();
                if hidden.contains(repo) {
                    notes.push("hidden");
                }
                if !app.store.polling(repo)? {
                    notes.push("paused");
                }
                let notes = if notes.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", notes.join(", ")).dimmed().to_string()
                };
                println!("{} [{}]{}", repo.display().to_string().cyan(), health, notes);
            }
        }
    }
    Ok(())
}

fn cmd_logs(app: &App, path: Option<PathBuf>, lines: usize) -> Result<()> {
    debug!(?path, lines, "cmd_logs: called");
    let events_dir = app.config.events_dir();
    let entries = match path {
        Some(path) => {
            let path = absolute(&path).unwrap_or(path);
            read_repo_events(&events_dir, &path.display().to_string())?
        }
        None => read_all_events(&events_dir)?,
    };

    if entries.is_empty() {
        println!("No events in {}", events_dir.display());
        return Ok(());
    }

    let start = entries.len().saturating_sub(lines);
    for entry in &entries[start..] {
        println!(
            "{} {} {:<15} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            entry.event.repo().cyan(),
            entry.event.event_type(),
            entry.event.summary()
        );
    }
    Ok(())
}
