//! Iaso - Self-Healing Knowledge Pipeline
//!
//! CLI entry point: schema initialization, interaction/feedback recording
//! for the external chat path, one-shot and scheduled pipeline runs, and a
//! status view of the ledger.

use anyhow::Context;
use clap::{Parser, Subcommand};
use iaso_core::{
    AnthropicOracle, Feedback, HealingConfig, HealingPipeline, HealingScheduler, InteractionId,
    InteractionLedger, JudgeOracle, LibsqlLedger, LocalEmbedder, OracleConfig, SqliteVecIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Get the default database path using the XDG data directory
fn get_default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("iaso")
        .join("iaso.db")
}

/// Resolve the database path from CLI arg, env var, or default
fn get_db_path(cli_path: Option<String>) -> String {
    cli_path
        .or_else(|| std::env::var("IASO_DB_PATH").ok())
        .unwrap_or_else(|| get_default_db_path().to_string_lossy().to_string())
}

#[derive(Parser)]
#[command(name = "iaso", version, about = "Self-healing knowledge pipeline")]
struct Cli {
    /// Database path (ledger and similarity index share one file)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the ledger and index schema
    Init,

    /// Record a question/answer exchange from the chat path
    Ingest {
        /// The user's question
        query: String,
        /// The assistant's answer
        response: String,
    },

    /// Record user feedback for an interaction
    Feedback {
        /// Interaction ID printed by `ingest`
        id: String,
        /// Rating: 1 (helpful) or -1 (unhelpful)
        rating: i32,
    },

    /// Execute one healing run
    Run,

    /// Run the healing pipeline on a recurring schedule
    Schedule,

    /// Show ledger counts
    Status,
}

async fn open_ledger(db_path: &str) -> anyhow::Result<Arc<LibsqlLedger>> {
    if let Some(parent) = PathBuf::from(db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {:?}", parent))?;
    }
    Ok(Arc::new(LibsqlLedger::open(db_path).await?))
}

async fn build_pipeline(
    db_path: &str,
    config: &HealingConfig,
) -> anyhow::Result<(Arc<LibsqlLedger>, HealingPipeline)> {
    let ledger = open_ledger(db_path).await?;

    let embedder = Arc::new(LocalEmbedder::new(&config.embedding_model, None).await?);
    let index = Arc::new(SqliteVecIndex::new(db_path, embedder)?);
    index.init_schema().await?;

    let oracle = Arc::new(AnthropicOracle::new(OracleConfig::from_healing_config(
        config,
    ))?);

    let pipeline = HealingPipeline::new(
        Arc::clone(&ledger) as Arc<dyn InteractionLedger>,
        index,
        Arc::clone(&oracle) as Arc<dyn JudgeOracle>,
        oracle,
        config,
    );

    Ok((ledger, pipeline))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = HealingConfig::load()?;
    let db_path = get_db_path(cli.db);

    match cli.command {
        Command::Init => {
            let _ledger = open_ledger(&db_path).await?;
            let embedder = Arc::new(LocalEmbedder::new(&config.embedding_model, None).await?);
            let index = SqliteVecIndex::new(&db_path, embedder)?;
            index.init_schema().await?;
            info!("Initialized database at {}", db_path);
        }

        Command::Ingest { query, response } => {
            let ledger = open_ledger(&db_path).await?;
            let id = ledger.record_interaction(&query, &response).await?;
            println!("{}", id);
        }

        Command::Feedback { id, rating } => {
            let feedback = match rating {
                r if r > 0 => Feedback::Positive,
                r if r < 0 => Feedback::Negative,
                _ => anyhow::bail!("rating must be 1 or -1"),
            };
            let ledger = open_ledger(&db_path).await?;
            let id = InteractionId::from_string(&id).context("invalid interaction id")?;
            ledger.record_feedback(id, feedback).await?;
            info!("Recorded {} feedback for {}", feedback, id);
        }

        Command::Run => {
            let (_ledger, pipeline) = build_pipeline(&db_path, &config).await?;
            let summary = pipeline.run_once().await?;
            println!("{}", summary);
        }

        Command::Schedule => {
            let (_ledger, pipeline) = build_pipeline(&db_path, &config).await?;
            let scheduler = Arc::new(HealingScheduler::new(
                Arc::new(pipeline),
                config.run_interval(),
                config.max_run_duration(),
            ));

            let shutdown = Arc::clone(&scheduler);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    shutdown.stop();
                }
            });

            scheduler.start().await?;
        }

        Command::Status => {
            let ledger = open_ledger(&db_path).await?;
            let eligible = ledger.count_eligible().await?;
            let processed = ledger.count_processed().await?;
            println!("eligible: {}", eligible);
            println!("processed: {}", processed);
            println!(
                "threshold: {} ({})",
                config.feedback_threshold,
                if eligible >= config.feedback_threshold {
                    "next run will heal"
                } else {
                    "below threshold, next run is a no-op"
                }
            );
        }
    }

    Ok(())
}
