//! `meridian` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the submission API.
//! - `worker`   — start a queue worker that drives runs to completion.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow graph JSON file.

mod config;

use crate::config::Config;
use clap::{Parser, Subcommand};
use meridian_api::{router, ApiConfig, AppState};
use meridian_events::NatsEventBus;
use meridian_execution::{DefaultNodeExecutor, Engine, TenantResources};
use meridian_graph::{GraphBuilder, WorkflowGraph};
use meridian_queue::{NatsQueueConfig, NatsWorkQueue, WorkQueue};
use meridian_store::{PgNodeExecutionStore, PgRunStore, PgWorkflowRepository};
use rootcause::ResultExt;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "meridian", about = "Multi-tenant workflow execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the submission API.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Start a worker that dequeues runs and drives them to completion.
    Worker,
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow graph JSON file.
    Validate {
        /// Path to the workflow graph JSON file.
        path: std::path::PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> meridian_core::Result<(), &'static str> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => serve(&bind).await,
        Command::Worker => worker().await,
        Command::Migrate { database_url } => migrate(&database_url).await,
        Command::Validate { path } => {
            validate(&path);
            Ok(())
        }
    }
}

async fn serve(bind: &str) -> meridian_core::Result<(), &'static str> {
    init_tracing();
    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let queue = NatsWorkQueue::new(NatsQueueConfig::new(&config.nats_url))
        .await
        .context("failed to connect to NATS work queue")?;
    let events = NatsEventBus::new(&config.nats_url).await.context("failed to connect to NATS event bus")?;

    let run_store: Arc<dyn meridian_execution::ports::RunStore> = Arc::new(PgRunStore::new(pool));
    let queue: Arc<dyn WorkQueue> = Arc::new(queue);
    let events: Arc<dyn meridian_execution::ports::EventBus> = Arc::new(events);

    let api_config = ApiConfig { max_payload_bytes: config.submission.max_payload_bytes };
    let state = Arc::new(AppState::new(run_store, queue, events, api_config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await.context("failed to bind submission API listener")?;
    info!(bind, "submission API listening");
    axum::serve(listener, app).await.context("submission API server failed")?;
    Ok(())
}

async fn worker() -> meridian_core::Result<(), &'static str> {
    init_tracing();
    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let run_store = PgRunStore::new(pool.clone());
    let node_store = PgNodeExecutionStore::new(pool.clone());
    let repository = PgWorkflowRepository::new(pool);
    let executor = DefaultNodeExecutor::default();
    let events = NatsEventBus::new(&config.nats_url).await.context("failed to connect to NATS event bus")?;
    let engine = Engine::new(run_store, node_store, repository, executor, events);

    let queue = NatsWorkQueue::new(NatsQueueConfig::new(&config.nats_url))
        .await
        .context("failed to connect to NATS work queue")?;

    info!("worker started, polling for work");
    loop {
        match queue.dequeue().await {
            Ok(Some(delivery)) => {
                let item = &delivery.item;
                info!(run_id = %item.run_id, workflow_id = %item.workflow_id, "dequeued run");
                match engine.process_run(item.run_id, TenantResources::default()).await {
                    Ok(()) => {
                        if let Err(e) = delivery.ack().await {
                            warn!(error = %e, "failed to ack processed run");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, run_id = %item.run_id, "run processing failed, nacking for redelivery");
                        if let Err(e) = delivery.nack().await {
                            warn!(error = %e, "failed to nack failed run");
                        }
                    }
                }
            }
            Ok(None) => {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            Err(e) => {
                warn!(error = %e, "dequeue failed, backing off");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

async fn migrate(database_url: &str) -> meridian_core::Result<(), &'static str> {
    init_tracing();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    info!("running migrations");
    sqlx::migrate!("../../migrations").run(&pool).await.context("migration failed")?;
    info!("migrations applied successfully");
    Ok(())
}

fn validate(path: &std::path::Path) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("cannot read file {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    let graph: WorkflowGraph = match serde_json::from_str(&content) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("invalid workflow JSON: {e}");
            std::process::exit(1);
        }
    };

    match GraphBuilder::build(&graph) {
        Ok(plan) => {
            println!(
                "workflow is valid: {} nodes, {} parallel groups, max parallelism {}",
                plan.total_tasks,
                plan.parallel_groups.len(),
                plan.parallelization_level
            );
        }
        Err(e) => {
            eprintln!("validation failed: {e}");
            std::process::exit(1);
        }
    }
}
