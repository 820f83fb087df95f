// ============================================================================
// wowfy: command-line driver for the task progression flow
// ============================================================================
// Usage:
//   wowfy session show                        Print the cached user session
//   wowfy session set --id 42 --name Asha     Cache a user session (login)
//   wowfy session clear                       Drop the cached session (logout)
//   wowfy stats                               Show session store statistics
//   wowfy track --task task.json --user-task-id 501 --samples walk.jsonl
//                                             Replay recorded sensor readings
//                                             through a task against the API
//   wowfy next --task-id 12 --challenge-id 3  Resolve the task after another
// ============================================================================

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use wowfy_core::{
    present_error, ClientConfig, DistanceMatrixClient, HttpWowfyApi, NavigationPresenter,
    NextTaskResolver, SensorEvent, SensorKind, SensorReading, SensorSource, SessionStore,
    Subscription, Task, TaskAssignment, TaskCompletionController, TaskContext, UserSession,
    WowfyApi, WowfyError, WowfyResult,
};

/// Wowfy task progression tool
#[derive(Parser)]
#[command(name = "wowfy", version, about = "Drive Wowfy challenge tasks from the command line")]
struct Cli {
    /// Path to the session store (default: ~/.wowfy/session.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or change the cached user session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show session store statistics
    Stats,

    /// Run a task from recorded sensor readings until it completes
    Track {
        /// Task JSON as returned by the challenge API
        #[arg(long)]
        task: PathBuf,

        /// Assignment the progress is reported against
        #[arg(long)]
        user_task_id: String,

        /// Challenge id (default: the task's own challenge_id)
        #[arg(long)]
        challenge_id: Option<String>,

        /// Sensor readings, one JSON object per line
        #[arg(long)]
        samples: PathBuf,
    },

    /// Resolve (and assign) the task following a completed one
    Next {
        #[arg(long)]
        task_id: String,

        #[arg(long)]
        challenge_id: String,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    Show,
    Set {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        mobile: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },
    Clear,
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wowfy_core=info".parse()?)
                .add_directive("wowfy=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let db_path = cli.db_path.clone().or_else(|| config.db_path.clone());
    let store = SessionStore::open(db_path.as_deref())?;

    match cli.command {
        Commands::Session { action } => cmd_session(&store, action),
        Commands::Stats => cmd_stats(&store),
        Commands::Track {
            task,
            user_task_id,
            challenge_id,
            samples,
        } => cmd_track(&config, &store, &task, user_task_id, challenge_id, &samples).await,
        Commands::Next {
            task_id,
            challenge_id,
        } => cmd_next(&config, &store, &task_id, &challenge_id).await,
    }
}

fn cmd_session(store: &SessionStore, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Show => match store.load()? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => println!("No cached session."),
        },
        SessionAction::Set {
            id,
            name,
            mobile,
            email,
        } => {
            let mut session = UserSession::new(id, name);
            session.mobile = mobile;
            session.email = email;
            let saved = store.save(&session)?;
            println!("Cached session for user {} ({})", saved.id, saved.name);
        }
        SessionAction::Clear => {
            if store.clear()? {
                println!("Session cleared.");
            } else {
                println!("No cached session.");
            }
        }
    }
    Ok(())
}

fn cmd_stats(store: &SessionStore) -> Result<()> {
    let stats = store.stats()?;

    println!("=== Wowfy Session Store ===");
    println!("Database: {}", stats.path);
    println!("Entries:  {}", stats.entries);
    println!("User:     {}", stats.user_id.as_deref().unwrap_or("-"));
    println!(
        "Cached:   {}",
        stats
            .cached_at
            .map(format_timestamp)
            .unwrap_or_else(|| "N/A".into())
    );
    Ok(())
}

fn require_session(store: &SessionStore) -> Result<UserSession> {
    store
        .load()?
        .ok_or_else(|| anyhow!("No cached session. Run `wowfy session set` first."))
}

async fn cmd_track(
    config: &ClientConfig,
    store: &SessionStore,
    task_path: &Path,
    user_task_id: String,
    challenge_id: Option<String>,
    samples_path: &Path,
) -> Result<()> {
    let session = require_session(store)?;

    let raw = std::fs::read_to_string(task_path)
        .with_context(|| format!("Failed to read {}", task_path.display()))?;
    let task: Task = serde_json::from_str(&raw).context("Invalid task JSON")?;
    let challenge_id = challenge_id
        .or_else(|| task.challenge_id.clone())
        .ok_or_else(|| anyhow!("Task has no challenge_id; pass --challenge-id"))?;

    let readings = read_samples(samples_path)?;
    info!("Replaying {} readings for task {}", readings.len(), task.task_id);

    let assignment = TaskAssignment {
        user_task_id,
        task_id: task.task_id.clone(),
        challenge_id: challenge_id.clone(),
        user_id: session.id.clone(),
    };
    let ctx = TaskContext {
        task: task.clone(),
        assignment: assignment.clone(),
    };

    let api: Arc<dyn WowfyApi> = Arc::new(HttpWowfyApi::from_config(config));
    let mut controller = TaskCompletionController::new(ctx, Arc::clone(&api), config)?;
    if let Some(client) = DistanceMatrixClient::from_config(config) {
        controller = controller.with_route_distance(Arc::new(client));
    }

    let source = ReplaySource::new(readings);
    let mut presenter = NavigationPresenter::new(assignment);

    match controller.run(&source).await {
        Ok(outcome) => {
            println!(
                "Task {} completed: {}",
                task.task_id,
                serde_json::to_string(&outcome.final_sample)?
            );
            let resolver = NextTaskResolver::new(api);
            match resolver.resolve(&session.id, &task.task_id, &challenge_id).await {
                Ok(next) => presenter = presenter.with_next(next),
                Err(e) => print_alert(&e)?,
            }
        }
        Err(e) => print_alert(&e)?,
    }

    let view = presenter.view(controller.state(), &task, controller.last_sample());
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

async fn cmd_next(
    config: &ClientConfig,
    store: &SessionStore,
    task_id: &str,
    challenge_id: &str,
) -> Result<()> {
    let session = require_session(store)?;
    let api: Arc<dyn WowfyApi> = Arc::new(HttpWowfyApi::from_config(config));
    let resolver = NextTaskResolver::new(api);

    let next = resolver.resolve(&session.id, task_id, challenge_id).await?;
    println!("{}", serde_json::to_string_pretty(&next)?);
    Ok(())
}

fn print_alert(err: &WowfyError) -> Result<()> {
    warn!("{}", err);
    eprintln!("{}", serde_json::to_string_pretty(&present_error(err))?);
    Ok(())
}

fn read_samples(path: &Path) -> Result<Vec<SensorReading>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid reading", path.display(), n + 1))
        })
        .collect()
}

// ============================================================================
// Replay source
// ============================================================================

/// Streams recorded readings to a single subscriber, then ends the stream
struct ReplaySource {
    readings: Vec<SensorReading>,
}

impl ReplaySource {
    fn new(readings: Vec<SensorReading>) -> Self {
        Self { readings }
    }
}

#[async_trait]
impl SensorSource for ReplaySource {
    async fn start(&self, kinds: &[SensorKind]) -> WowfyResult<Subscription> {
        let (tx, rx) = mpsc::channel(wowfy_core::sensor::DEFAULT_SENSOR_BUFFER);
        let readings: Vec<SensorReading> = self
            .readings
            .iter()
            .filter(|r| kinds.contains(&r.kind()))
            .cloned()
            .collect();

        let feeder = tokio::spawn(async move {
            for reading in readings {
                if tx.send(SensorEvent::Reading(reading)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, move || feeder.abort()))
    }
}
