//! Standings CLI
//!
//! Rebuilds the Weekly, Overall, and Survivor leaderboards for a week, either against
//! the pool's Postgres database or against a JSON fact fixture.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{error, info};

use standings_engine::{
    FactReader, InMemoryLeaderboardStore, LeaderboardKind, LeaderboardStore, OverallSource,
    RunRequest, StandingsEngine, Week,
};
use standings_service::{
    connect, dry_run, initialize_logging, load_fixture, PgFactReader, PgLeaderboardStore,
    ServiceConfig,
};

#[derive(Parser, Debug)]
#[command(name = "standings", version, about = "Pick pool standings engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild leaderboards for one week
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Target week (1-based)
    #[arg(long)]
    week: Week,

    /// Leaderboards to rebuild; repeatable, defaults to all
    #[arg(long = "kind", value_enum)]
    kinds: Vec<KindArg>,

    /// Overall aggregation path, overriding STANDINGS_OVERALL_SOURCE
    #[arg(long, value_enum)]
    overall_source: Option<SourceArg>,

    /// Read facts from a JSON fixture instead of Postgres
    #[arg(long)]
    facts: Option<PathBuf>,

    /// Compute and print the boards without writing them
    #[arg(long)]
    dry_run: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KindArg {
    All,
    Weekly,
    Overall,
    Survivor,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Picks,
    Weekly,
}

impl From<SourceArg> for OverallSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Picks => OverallSource::Picks,
            SourceArg::Weekly => OverallSource::WeeklyRows,
        }
    }
}

impl RunArgs {
    fn request(&self) -> RunRequest {
        if self.kinds.is_empty() || self.kinds.contains(&KindArg::All) {
            return RunRequest::all(self.week);
        }

        let mut kinds = Vec::with_capacity(self.kinds.len());
        for kind in &self.kinds {
            let kind = match kind {
                KindArg::Weekly => LeaderboardKind::Weekly,
                KindArg::Overall => LeaderboardKind::Overall,
                KindArg::Survivor => LeaderboardKind::Survivor,
                KindArg::All => continue,
            };
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        RunRequest::new(self.week, kinds)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;
    initialize_logging(&config.logging)?;

    info!("Starting standings v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Command::Run(args) => run(args, config).await,
    };

    if let Err(e) = &result {
        error!("Standings run failed: {:#}", e);
    }
    result
}

async fn run(args: RunArgs, mut config: ServiceConfig) -> Result<()> {
    if let Some(source) = args.overall_source {
        config.engine.overall_source = source.into();
    }
    let request = args.request();

    if args.dry_run && args.facts.is_some() && config.engine.overall_source == OverallSource::WeeklyRows {
        bail!("--dry-run with --facts has no stored weekly rows to fold; use --overall-source picks");
    }

    let output = match &args.facts {
        Some(path) => {
            let facts = load_fixture(path)
                .with_context(|| format!("Failed to load fixture {}", path.display()))?;
            let engine = StandingsEngine::new(config.engine.clone(), facts, InMemoryLeaderboardStore::new())?;

            let mut output = execute(&engine, &request, args.dry_run).await?;
            if !args.dry_run {
                output["leaderboards"] = serde_json::to_value(engine.store().snapshots().await)?;
            }
            output
        }
        None => {
            let pool = connect(&config).await.context("Failed to connect to the database")?;
            let engine = StandingsEngine::new(
                config.engine.clone(),
                PgFactReader::new(pool.clone()),
                PgLeaderboardStore::new(pool),
            )?;
            execute(&engine, &request, args.dry_run).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn execute<F, S>(engine: &StandingsEngine<F, S>, request: &RunRequest, dry: bool) -> Result<serde_json::Value>
where
    F: FactReader,
    S: LeaderboardStore,
{
    info!(week = request.week, kinds = ?request.kinds, dry_run = dry, "Running standings");

    if dry {
        let boards = dry_run(engine, request, engine.config().overall_source).await?;
        return Ok(json!({ "leaderboards": boards }));
    }

    let reports = engine.run(request).await?;
    Ok(json!({ "reports": reports }))
}
