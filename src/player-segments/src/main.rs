//! Player Segments — preview group sizes and materialize group membership
//! for a player dataset and a JSON rule set.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use player_core::{read_json_file, AppConfig, Scope};
use player_segmentation::sql::render_count;
use player_segmentation::{
    compile_rule_set, Dataset, MembershipSynchronizer, MemoryStore, RuleSet, SegmentError,
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "player-segments")]
#[command(about = "Evaluate player group rule sets against a player dataset")]
#[command(version)]
struct Cli {
    /// Player ids fetched per page when materializing membership (overrides config)
    #[arg(long, env = "PLAYER_SEGMENTS__SEGMENTATION__BATCH_SIZE")]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count the players a rule set matches (group size preview)
    Count(Target),
    /// Create a group from a rule set and print its members
    Members {
        #[command(flatten)]
        target: Target,
        /// Group name
        #[arg(long, default_value = "preview")]
        name: String,
    },
    /// Print the SQL count query a rule set compiles to
    Sql {
        /// Rule set JSON file
        #[arg(long)]
        rules: PathBuf,
        #[arg(long)]
        game_id: Uuid,
        #[arg(long, default_value_t = false)]
        include_dev: bool,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// Dataset JSON file (players, aliases, stats, leaderboard entries)
    #[arg(long)]
    dataset: PathBuf,
    /// Rule set JSON file
    #[arg(long)]
    rules: PathBuf,
    #[arg(long)]
    game_id: Uuid,
    /// Count players from dev builds
    #[arg(long, default_value_t = false)]
    include_dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "player_segments=info,player_segmentation=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(batch_size) = cli.batch_size {
        config.segmentation.batch_size = batch_size;
    }

    match cli.command {
        Command::Count(target) => {
            let (sync, rules) = load(&config, &target)?;
            let count = sync
                .evaluator()
                .preview_count(&rules, target.game_id, target.include_dev)
                .await
                .map_err(report)?;
            println!("{}", json!({ "count": count }));
        }
        Command::Members { target, name } => {
            config.segmentation.include_dev_players = target.include_dev;
            let (sync, rules) = load(&config, &target)?;
            let (group, diff) = sync
                .create_group(target.game_id, name, rules)
                .await
                .map_err(report)?;
            let mut members: Vec<Uuid> = sync.members(group.id).await?.into_iter().collect();
            members.sort_unstable();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "group": group.summary(),
                    "count": diff.total,
                    "members": members,
                }))?
            );
        }
        Command::Sql {
            rules,
            game_id,
            include_dev,
        } => {
            let rules: RuleSet = read_json_file(&rules)
                .with_context(|| format!("reading rule set {}", rules.display()))?;
            let predicate = compile_rule_set(&rules).map_err(report)?;
            let query = render_count(&predicate, &Scope::new(game_id, include_dev));
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "sql": query.sql,
                    "params": query.params,
                }))?
            );
        }
    }

    Ok(())
}

fn load(
    config: &AppConfig,
    target: &Target,
) -> anyhow::Result<(MembershipSynchronizer<MemoryStore>, RuleSet)> {
    let dataset: Dataset = read_json_file(&target.dataset)
        .with_context(|| format!("reading dataset {}", target.dataset.display()))?;
    let rules: RuleSet = read_json_file(&target.rules)
        .with_context(|| format!("reading rule set {}", target.rules.display()))?;

    info!(
        players = dataset.players.len(),
        rules = rules.rules.len(),
        batch_size = config.segmentation.batch_size,
        "dataset loaded"
    );

    let store = Arc::new(MemoryStore::from_dataset(dataset));
    Ok((MembershipSynchronizer::new(store, &config.segmentation), rules))
}

/// Print every rule violation before failing, one per line.
fn report(err: SegmentError) -> anyhow::Error {
    for violation in err.violations() {
        eprintln!("{violation}");
    }
    err.into()
}
