//! Snake draft server.
//!
//! Hosts the draft engine: recovers rooms left drafting by a previous run,
//! runs the stall sweep and stops every room actor cleanly on Ctrl+C.

mod config;
mod logging;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Error;
use config::{ServerConfig, StorageMode};
use ctrlc::set_handler;
use log::info;
use pico_args::Arguments;
use snake_draft::{
    DraftEngine,
    contest::{MemoryContestRepository, NewContest},
    db::Database,
    draft::{BroadcastHub, PricedBoardGenerator},
};
use tokio::sync::watch;

const HELP: &str = "\
Run the snake draft contest engine

USAGE:
  draft_server [OPTIONS]

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --memory                 Keep all state in memory and seed a demo contest
  --demo                   With --memory, fill the demo contest so a draft runs
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  DRAFT_TURN_SECS          Pick time limit per turn
  DRAFT_SWEEP_SECS         Stall sweep interval
  RUST_LOG                 Log filter (default: info,sqlx=warn)
";

struct Args {
    database_url: Option<String>,
    memory: bool,
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        database_url: pargs.opt_value_from_str("--db-url")?,
        memory: pargs.contains("--memory"),
        demo: pargs.contains("--demo"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.database_url, args.memory)?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    let hub = Arc::new(BroadcastHub::new());
    spawn_event_logger(&hub);
    let generator = Arc::new(PricedBoardGenerator::synthetic(config.pool_depth));

    let mut database = None;
    let engine = match config.storage {
        StorageMode::Postgres => {
            info!("Connecting to database: {}", config.database.database_url);
            let db = Database::new(&config.database)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
            db.health_check().await?;
            info!("Database connected successfully");

            let engine = DraftEngine::postgres(&db, hub.clone(), generator, config.engine.clone());
            database = Some(db);
            engine
        }
        StorageMode::Memory => {
            info!("Using in-memory storage");
            let repo = MemoryContestRepository::new();
            for user_id in 1..=config.demo_users as i64 {
                repo.create_account(user_id, config.demo_balance).await;
            }
            DraftEngine::in_memory(repo, hub.clone(), generator, config.engine.clone())
        }
    };

    if config.storage == StorageMode::Memory {
        seed_demo(&engine, &config, args.demo).await?;
    }

    // Pick up rooms a previous run left behind
    let start = Instant::now();
    let report = engine.sweep_once().await;
    logging::log_performance(
        "startup_sweep",
        start.elapsed().as_millis() as u64,
        Some(&format!(
            "{} launched, {} recovered",
            report.launched.len(),
            report.recovered.len()
        )),
    );

    let sweep = engine.spawn_stall_sweep(shutdown_rx.clone());
    info!(
        "Draft engine running (sweep every {}s). Press Ctrl+C to stop.",
        config.engine.draft.sweep_interval_secs
    );

    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    info!("Shutting down draft engine...");
    engine.shutdown().await;
    if let Err(e) = sweep.await {
        log::error!("Stall sweep task failed: {}", e);
    }
    if let Some(db) = database {
        db.close().await;
    }
    info!("Draft engine stopped");

    Ok(())
}

/// Forward every published event to the log
fn spawn_event_logger(hub: &BroadcastHub) {
    let mut events = hub.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => logging::log_draft_event(envelope.audience, &envelope.event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Event logger lagged, {} events not logged", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Create the demo contest and optionally fill it
async fn seed_demo(engine: &DraftEngine, config: &ServerConfig, fill: bool) -> Result<(), Error> {
    let contest = engine
        .repository()
        .create_contest(&NewContest::single_room("Demo Contest", 10))
        .await?;
    info!(
        "Created demo contest {} ({} seats, fee {})",
        contest.id, contest.max_entries, contest.entry_fee
    );

    if !fill {
        return Ok(());
    }

    for user_id in 1..=config.demo_users as i64 {
        let username = format!("drafter{user_id}");
        match engine.enter(contest.id, user_id, &username).await {
            Ok(admission) => info!(
                "✓ {} seated at position {} in room {}",
                username, admission.draft_position, admission.room_id
            ),
            Err(e) => log::error!("Failed to enter {}: {}", username, e.client_message()),
        }
    }
    Ok(())
}
