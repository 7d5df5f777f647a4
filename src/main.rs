use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};

use approval_sync::cli::{Cli, Commands, RunArgs};
use approval_sync::config::{AppConfig, ConfigSnapshot, ConfigWatcher, LoggingConfig, SnapshotHandle, load_config};
use approval_sync::daemon::{RunSummary, SyncDaemon};
use approval_sync::dingtalk::{DingTalkClient, NotableStore, WorkflowForms};
use approval_sync::domain::{Disposition, EventReport, SyncOutcome};
use approval_sync::sync::{RecentEvents, SyncOrchestrator};
use approval_sync::transport::JsonLinesTransport;

fn setup_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    let log_file = match &logging.file {
        Some(path) if path == Path::new("-") => None,
        Some(path) => Some(path.clone()),
        None => Some(
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("approval-sync")
                .join("logs")
                .join("approval-sync.log"),
        ),
    };

    match &log_file {
        Some(log_file) => {
            if let Some(log_dir) = log_file.parent() {
                fs::create_dir_all(log_dir).context("Failed to create log directory")?;
            }
            let target = Box::new(
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log_file)
                    .context("Failed to open log file")?,
            );
            builder.target(env_logger::Target::Pipe(target));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }
    builder.init();

    match log_file {
        Some(path) => info!("Logging initialized, writing to: {}", path.display()),
        None => info!("Logging initialized, writing to stderr"),
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: AppConfig, config_path: PathBuf) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        eprintln!("{}", "Verbose mode enabled".yellow());
    }

    let command = cli.command.clone().unwrap_or_else(Commands::default_run);
    match command {
        Commands::Run(args) => handle_run_command(&args, &config, config_path).await,
        Commands::FailedEvents { replay } => handle_failed_events_command(replay, &config).await,
        Commands::CheckConfig => handle_check_config_command(&config, &config_path),
    }
}

fn build_orchestrator(
    config: &AppConfig,
    client: Arc<DingTalkClient>,
) -> Result<Arc<SyncOrchestrator<NotableStore>>> {
    let snapshot = ConfigSnapshot::from_config(config, 1).context("Invalid approval rules")?;
    info!(
        "Loaded {} approval rules ({} enabled)",
        snapshot.rules.len(),
        snapshot.enabled_rules()
    );
    let store = Arc::new(NotableStore::new(Arc::clone(&client)));
    let orchestrator = SyncOrchestrator::new(store, SnapshotHandle::new(snapshot), RecentEvents::from_config(&config.dedup))
        .with_form_source(Arc::new(WorkflowForms::new(client)));
    Ok(Arc::new(orchestrator))
}

async fn open_events(path: Option<&PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event stream {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

async fn open_acks(path: Option<&PathBuf>) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create ack file {}", path.display()))?;
            Ok(Box::new(file))
        }
        _ => Ok(Box::new(tokio::io::stdout())),
    }
}

async fn handle_run_command(args: &RunArgs, config: &AppConfig, config_path: PathBuf) -> Result<()> {
    info!("Handling run command: {:?}", args);
    let client = Arc::new(DingTalkClient::from_config(&config.dingtalk).context("Failed to build DingTalk client")?);
    let orchestrator = build_orchestrator(config, Arc::clone(&client))?;

    let _watcher = if args.no_watch {
        None
    } else {
        Some(
            ConfigWatcher::spawn(config_path.clone(), orchestrator.snapshots().clone())
                .with_context(|| format!("Failed to watch {}", config_path.display()))?,
        )
    };

    let reader = open_events(args.events.as_ref()).await?;
    let acks = open_acks(args.acks.as_ref()).await?;
    let mut daemon = SyncDaemon::new(orchestrator, JsonLinesTransport::new(reader, acks));
    if !args.skip_failed_events {
        daemon = daemon.with_failed_feed(client);
    }

    eprintln!("{}", "Syncing approval events (Ctrl-C to stop)...".cyan());
    let summary = daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Sync daemon failed")?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    eprintln!("{}", "Sync stopped".green());
    eprintln!("  Deliveries: {}", summary.deliveries);
    eprintln!("  Replayed:   {}", summary.replayed);
    eprintln!(
        "  Events:     {} processed, {} ignored",
        summary.processed, summary.ignored
    );
    eprintln!(
        "  Actions:    {} applied, {} skipped, {}",
        summary.applied.to_string().green(),
        summary.skipped.to_string().yellow(),
        format!("{} failed", summary.failed).red()
    );
    if summary.system_errors > 0 {
        eprintln!("  {} {}", "System errors:".red(), summary.system_errors);
    }
}

async fn handle_failed_events_command(replay: bool, config: &AppConfig) -> Result<()> {
    info!("Handling failed-events command (replay: {})", replay);
    let client = Arc::new(DingTalkClient::from_config(&config.dingtalk).context("Failed to build DingTalk client")?);
    let batch = client.failed_events().await.context("Failed to fetch failed events")?;

    if batch.events.is_empty() {
        println!("{}", "No failed events".green());
    }
    for (i, event) in batch.events.iter().enumerate() {
        let mut data = event.data.to_string();
        if data.chars().count() > 300 {
            data = format!("{}...", data.chars().take(300).collect::<String>());
        }
        println!("{} {} {}", format!("[{}]", i + 1).cyan(), event.event_type.bold(), data);
    }
    if batch.skipped > 0 {
        println!("{} {} unreadable entries skipped", "Warning:".yellow(), batch.skipped);
    }
    if batch.has_more {
        println!("{}", "More failed events remain upstream".yellow());
    }

    if replay && !batch.events.is_empty() {
        let orchestrator = build_orchestrator(config, client)?;
        for event in &batch.events {
            let report = orchestrator.handle(event).await;
            print_report(&report);
        }
    }
    Ok(())
}

fn print_report(report: &EventReport) {
    let instance = report.instance_id.as_deref().unwrap_or("-");
    match &report.disposition {
        Disposition::Processed(actions) => {
            println!("{} {}", "Processed:".green(), instance);
            for action in actions {
                let outcome = match &action.outcome {
                    SyncOutcome::Applied { record_id, updated_fields } => {
                        format!("applied {} fields to {}", updated_fields, record_id).green()
                    }
                    SyncOutcome::Skipped(reason) => format!("skipped ({:?})", reason).yellow(),
                    SyncOutcome::Failed(kind) => format!("failed: {}", kind).red(),
                };
                println!("  {}#{} {} {}", action.rule_name, action.action_index, action.target, outcome);
            }
        }
        other => println!("{} {} {:?}", "Ignored:".yellow(), instance, other),
    }
}

fn handle_check_config_command(config: &AppConfig, config_path: &Path) -> Result<()> {
    info!("Checking config {}", config_path.display());
    let snapshot = ConfigSnapshot::from_config(config, 1).context("Invalid approval rules")?;

    println!("{} {}", "Config OK:".green(), config_path.display());
    println!(
        "  {} approval rules, {} enabled",
        snapshot.rules.len(),
        snapshot.enabled_rules()
    );
    for rule in &snapshot.rules {
        let state = if rule.enabled { "enabled".green() } else { "disabled".yellow() };
        println!("  {} ({}) [{}]", rule.name.bold(), rule.template_id, state);
        for action in &rule.actions {
            println!(
                "    -> {} find by '{}', {} updates",
                action.target,
                action.find_by.target_field_name,
                action.updates.len()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration; logging settings come from it
    let (config, config_path) = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config.logging, cli.is_verbose()).context("Failed to setup logging")?;

    info!("Starting with config from: {}", config_path.display());

    // Run the main application logic
    run_application(&cli, config, config_path).await.context("Application failed")?;

    Ok(())
}
