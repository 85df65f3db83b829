use anyhow::Context;
use clap::{Parser, Subcommand};
use score_store::open_store;
use scoring_engine::{
    CancellationFlag, EntityType, InMemoryProvider, Period, ScoreBroadcaster, ScoringConfig,
    ScoringEngine, ScoringScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Fantasy scoring runs for CannaLeague
#[derive(Parser)]
#[command(name = "scoring-engine")]
#[command(about = "Compute and persist CannaLeague entity and team scores")]
struct Cli {
    /// TOML configuration file (defaults and SCORING__* env vars apply otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fixture directory with leagues.json, stats/<period>.json and lineups/<period>.json
    #[arg(short, long, default_value = "./data/fixtures")]
    fixtures: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single entity
    Entity {
        /// Entity type (manufacturer, strain, product, pharmacy, brand)
        #[arg(long = "type")]
        entity_type: EntityType,
        /// Entity id
        #[arg(long)]
        id: String,
        /// Period (YYYY-MM-DD or YYYY-Www)
        #[arg(long)]
        period: Period,
    },
    /// Score one team's locked lineup
    Team {
        #[arg(long)]
        team: String,
        #[arg(long)]
        period: Period,
    },
    /// Score every team of a league
    League {
        #[arg(long)]
        league: String,
        #[arg(long)]
        period: Period,
    },
    /// Run the weekly scheduler until interrupted
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ScoringConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("📋 Configuration loaded (store: {:?})", config.store.backend);

    let provider = Arc::new(InMemoryProvider::from_dir(&cli.fixtures).await?);
    let store = open_store(&config.store).await.context("Failed to open score store")?;
    let broadcaster = Arc::new(ScoreBroadcaster::new());

    let engine = Arc::new(ScoringEngine::new(
        config.clone(),
        provider.clone(),
        provider,
        Arc::from(store),
        broadcaster,
    ));

    match cli.command {
        Commands::Entity { entity_type, id, period } => {
            let score = engine.calculate_entity_score(&id, entity_type, period).await?;
            println!("{}", serde_json::to_string_pretty(&score)?);
        }
        Commands::Team { team, period } => {
            let score = engine.calculate_team_score(&team, period).await?;
            println!("{}", serde_json::to_string_pretty(&score)?);
        }
        Commands::League { league, period } => {
            let cancel = CancellationFlag::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });

            let report = engine.calculate_league_week(&league, period, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.complete {
                error!("❌ {}", report.summary());
                std::process::exit(2);
            }
        }
        Commands::Schedule => {
            if !config.schedule.enabled {
                anyhow::bail!("schedule.enabled is false; set SCORING__SCHEDULE__ENABLED=true");
            }
            let scheduler = ScoringScheduler::new(engine, &config.schedule)?;
            tokio::select! {
                result = scheduler.start() => result?,
                _ = tokio::signal::ctrl_c() => {
                    scheduler.cancellation().cancel();
                    info!("Interrupted, stopping scheduler");
                }
            }
        }
    }

    Ok(())
}
