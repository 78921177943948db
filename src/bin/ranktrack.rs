//! Ranktrack CLI: inspect the local Beat Savior cache.
//!
//! Usage:
//!   ranktrack status <player-id> [--db path] [--main-player id]
//!   ranktrack records <player-id> [--db path]
//!   ranktrack track <player-id> [--name name] [--db path]

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use ranktrack::{
    AppContext, BeatSaviorRecord, BeatSaviorSource, OpenStore, Player, PlayerDirectory,
    PlayerRefreshRecord, Priority, SourceError, SqliteStore, StoredPlayerDirectory, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "ranktrack",
    version,
    about = "Cached player score data with tiered refreshes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Player the application runs for (shortest refresh window)
    #[arg(long, global = true, env = "RANKTRACK_MAIN_PLAYER")]
    main_player: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a player's refresh tier and whether a refresh is due
    Status {
        /// Player to inspect
        player_id: String,
    },
    /// List cached Beat Savior records of a player
    Records {
        /// Player whose records to list
        player_id: String,
    },
    /// Add a player to the local cache
    Track {
        /// Player to track
        player_id: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
}

/// Source used when no remote client is wired in; every fetch fails.
struct OfflineSource;

#[async_trait]
impl BeatSaviorSource for OfflineSource {
    async fn get_processed(
        &self,
        _player_id: &str,
        _priority: Priority,
    ) -> Result<Option<Vec<BeatSaviorRecord>>, SourceError> {
        Err(SourceError::Unavailable("offline".to_string()))
    }
}

/// Get the default database path (~/.local/share/ranktrack/ranktrack.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("ranktrack").join("ranktrack.db")
}

struct Cache {
    context: AppContext,
    directory: Arc<StoredPlayerDirectory>,
}

fn open_cache(db: Option<PathBuf>, main_player: Option<String>) -> Result<Cache, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store =
        SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;

    let mut directory = StoredPlayerDirectory::new(Arc::new(store.repository::<Player>()));
    if let Some(main_player) = main_player {
        directory = directory.with_main_player(main_player);
    }
    let directory = Arc::new(directory);

    let context = AppContext::new(
        Arc::new(OfflineSource),
        Arc::new(store.repository::<BeatSaviorRecord>()),
        Arc::new(store.repository::<PlayerRefreshRecord>()),
        directory.clone() as Arc<dyn PlayerDirectory>,
        Arc::new(SystemClock),
    );

    Ok(Cache { context, directory })
}

async fn cmd_status(cache: &Cache, player_id: &str) -> i32 {
    let service = cache.context.beat_savior();

    let tier = match service.tier(player_id).await {
        Ok(tier) => tier,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let last_refresh = match service.last_refresh(player_id).await {
        Ok(last) => last.map(|r| r.last_refresh),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let decision = match service.decide(player_id, false).await {
        Ok(decision) => decision,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Player:        {}", player_id);
    println!("Tier:          {} ({} min window)", tier, tier.interval().num_minutes());
    match last_refresh {
        Some(last) => {
            println!("Last refresh:  {}", last.to_rfc3339());
            println!("Next due:      {}", (last + tier.interval()).to_rfc3339());
        }
        None => println!("Last refresh:  never"),
    }
    println!(
        "Refresh due:   {} ({})",
        if decision.should_refresh() { "yes" } else { "no" },
        decision
    );
    0
}

async fn cmd_records(cache: &Cache, player_id: &str) -> i32 {
    let service = cache.context.beat_savior();
    let records = match service.get_all_player_scores(player_id).await {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if records.is_empty() {
        println!("No Beat Savior records cached for '{}'.", player_id);
        return 0;
    }

    println!("{:<24}  {:<40}  {:<12}  {:>9}  {:<4}", "ID", "HASH", "DIFF", "SCORE", "WON");
    println!("{}", "-".repeat(99));
    for record in records {
        println!(
            "{:<24}  {:<40}  {:<12}  {:>9}  {:<4}",
            record.beat_savior_id,
            record.hash.as_deref().unwrap_or("-"),
            record.diff.as_deref().unwrap_or("-"),
            record.score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            if record.is_won() { "yes" } else { "no" },
        );
    }
    0
}

async fn cmd_track(cache: &Cache, player_id: &str, name: Option<String>) -> i32 {
    let mut player = Player::new(player_id);
    if let Some(name) = name {
        player = player.with_name(name);
    }
    match cache.directory.track(&player).await {
        Ok(()) => {
            println!("Tracking player '{}'", player_id);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ranktrack=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cache = match open_cache(cli.db, cli.main_player) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Status { player_id } => cmd_status(&cache, &player_id).await,
        Commands::Records { player_id } => cmd_records(&cache, &player_id).await,
        Commands::Track { player_id, name } => cmd_track(&cache, &player_id, name).await,
    };
    std::process::exit(code);
}
