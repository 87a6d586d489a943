//! kbsync: command-line host for the dashboard synchronization layer.
//!
//! Plays the role of the dashboard shell: builds the components once,
//! drives them from subcommands and renders state changes as log lines.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use kbsync::jobs::{DuplicateConflict, PendingDecision};
use kbsync::{
    load_config, Dashboard, Decision, DuplicateResolver, FixedResolver, JobSnapshot,
    PromptResolver, Session, SyncConfig, UploadFile, UploadOutcome,
};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kbsync")]
#[command(author, version, about = "Keep a local view of knowledge-base ingestion jobs in sync")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "kbsync.json")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the current job list and quota
    List,

    /// Upload a document
    Upload {
        /// File to upload
        path: PathBuf,

        /// What to do when a document with the same name exists
        #[arg(long, value_enum, default_value_t = OnDuplicate::Ask)]
        on_duplicate: OnDuplicate,

        /// Keep polling until the server finishes processing
        #[arg(long)]
        wait: bool,
    },

    /// Delete a document by id
    Delete {
        /// Server-assigned document id
        id: String,
    },

    /// Follow jobs, quota and notifications until interrupted
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnDuplicate {
    Replace,
    Rename,
    Cancel,
    Ask,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = load_config(&cli.config)?;
    let session = Arc::new(Session::new(config.auth.resolve()?));
    info!("kbsync v{} using {}", env!("CARGO_PKG_VERSION"), config.api_base_url);

    match cli.command {
        Commands::List => cmd_list(config, session).await,
        Commands::Upload {
            path,
            on_duplicate,
            wait,
        } => cmd_upload(config, session, path, on_duplicate, wait).await,
        Commands::Delete { id } => cmd_delete(config, session, &id).await,
        Commands::Watch => cmd_watch(config, session).await,
    }
}

async fn cmd_list(config: SyncConfig, session: Arc<Session>) -> CliResult<()> {
    let dashboard = Dashboard::new(config, session, Arc::new(FixedResolver(Decision::Cancel)))?;
    dashboard.refresh().await?;
    if let Err(e) = dashboard.refresh_quota().await {
        warn!("Quota unavailable: {}", e);
    }
    dashboard.scheduler().stop();

    print_jobs(&dashboard.jobs());
    if let Some(quota) = dashboard.quota() {
        println!(
            "tokens: {} used, {} remaining ({:.1}%)",
            quota.used, quota.remaining, quota.usage_percentage
        );
    }
    Ok(())
}

async fn cmd_upload(
    config: SyncConfig,
    session: Arc<Session>,
    path: PathBuf,
    on_duplicate: OnDuplicate,
    wait: bool,
) -> CliResult<()> {
    let mut prompts = None;
    let resolver: Arc<dyn DuplicateResolver> = match on_duplicate {
        OnDuplicate::Replace => Arc::new(FixedResolver(Decision::Replace)),
        OnDuplicate::Rename => Arc::new(FixedResolver(Decision::Rename)),
        OnDuplicate::Cancel => Arc::new(FixedResolver(Decision::Cancel)),
        OnDuplicate::Ask => {
            let (resolver, receiver) = PromptResolver::channel(1);
            prompts = Some(receiver);
            Arc::new(resolver)
        }
    };
    if let Some(prompts) = prompts {
        tokio::spawn(answer_prompts(prompts));
    }

    let dashboard = Dashboard::new(config, session, resolver)?;
    dashboard.start().await?;

    let file = UploadFile::from_path(&path).await?;
    let outcome = dashboard.upload(file).await;
    let record = match outcome {
        Ok(UploadOutcome::Uploaded(record)) => record,
        Ok(UploadOutcome::Cancelled) => {
            info!("Upload cancelled");
            dashboard.shutdown();
            return Ok(());
        }
        Err(e) => {
            dashboard.shutdown();
            return Err(e.into());
        }
    };
    println!("{}\t{}\t{}", record.id, record.status, record.original_file_name);

    if wait {
        let mut changes = dashboard.store().subscribe();
        loop {
            let finished = changes
                .borrow_and_update()
                .get(&record.id)
                .map_or(true, |r| r.status.is_terminal());
            if finished {
                break;
            }
            if changes.changed().await.is_err() {
                break;
            }
        }
        if let Some(done) = dashboard.store().get(&record.id) {
            println!("{}\t{}\t{}", done.id, done.status, done.original_file_name);
        }
    }

    dashboard.shutdown();
    Ok(())
}

async fn cmd_delete(config: SyncConfig, session: Arc<Session>, id: &str) -> CliResult<()> {
    let dashboard = Dashboard::new(config, session, Arc::new(FixedResolver(Decision::Cancel)))?;
    dashboard.delete_document(id).await?;
    println!("deleted {}", id);
    Ok(())
}

async fn cmd_watch(config: SyncConfig, session: Arc<Session>) -> CliResult<()> {
    let dashboard = Dashboard::new(config, session, Arc::new(FixedResolver(Decision::Cancel)))?;
    let mut notifications = dashboard.notifier().subscribe();
    let mut jobs = dashboard.store().subscribe();
    let mut quota = dashboard.quota_monitor().subscribe();
    let mut connection = dashboard.telemetry().subscribe_state();

    dashboard.start().await?;
    print_jobs(&dashboard.jobs());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            Ok(notification) = notifications.recv() => {
                println!("[{}] {}: {}", notification.level, notification.title, notification.message);
            }
            Ok(()) = jobs.changed() => {
                let snapshot = jobs.borrow_and_update().clone();
                print_jobs(&snapshot);
            }
            Ok(()) = quota.changed() => {
                if let Some(q) = quota.borrow_and_update().clone() {
                    println!("tokens: {} used, {} remaining ({:.1}%)", q.used, q.remaining, q.usage_percentage);
                }
            }
            Ok(()) = connection.changed() => {
                let state = *connection.borrow_and_update();
                info!("Live updates: {}", state);
            }
        }
    }

    dashboard.shutdown();
    Ok(())
}

fn print_jobs(snapshot: &JobSnapshot) {
    let counts = snapshot.counts();
    println!(
        "jobs: {} pending, {} processing, {} completed, {} failed, {} uploading",
        counts.pending, counts.processing, counts.completed, counts.failed, counts.optimistic
    );
    for job in snapshot.iter() {
        let marker = if job.is_optimistic { "*" } else { " " };
        println!(
            "{}{}\t{}\t{:>3}%\t{}",
            marker, job.id, job.status, job.progress_percent, job.original_file_name
        );
    }
}

/// Reads duplicate decisions from the terminal.
async fn answer_prompts(mut prompts: mpsc::Receiver<PendingDecision>) {
    while let Some(pending) = prompts.recv().await {
        let conflict = pending.conflict.clone();
        let answer = tokio::task::spawn_blocking(move || ask(&conflict)).await;
        let decision = match answer {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                warn!("Could not read answer, cancelling: {}", e);
                Decision::Cancel
            }
            Err(e) => {
                warn!("Prompt task failed, cancelling: {}", e);
                Decision::Cancel
            }
        };
        pending.decide(decision);
    }
}

fn ask(conflict: &DuplicateConflict) -> std::io::Result<Decision> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        write!(
            stdout,
            "'{}' already exists. [r]eplace, re[n]ame to '{}', or [c]ancel? ",
            conflict.file_name, conflict.suggested_name
        )?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(Decision::Cancel);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "replace" => return Ok(Decision::Replace),
            "n" | "rename" => return Ok(Decision::Rename),
            "c" | "cancel" | "" => return Ok(Decision::Cancel),
            other => writeln!(stdout, "Unrecognized answer '{}'", other)?,
        }
    }
}
