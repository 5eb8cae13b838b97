pub mod clock;
pub mod db;
pub mod engine;
pub mod lifecycle;
pub mod models;
pub mod presence;
pub mod reconcile;
pub mod settings;
pub mod store;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use clock::{Clock, SystemClock};
use db::Database;
use engine::{EngineStatus, ReconciliationEngine, Scheduler};
use lifecycle::{AppPhase, LifecycleMonitor};
use presence::HttpPresenceSource;
use settings::{SettingsStore, SETTINGS_FILE};
use store::DAY_LOG_PREFIX;

const DATA_DIR_ENV: &str = "PLAYTALLY_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".playtally";

/// Runs the engine headless until Ctrl-C. Host lifecycle phases are read from
/// stdin, one per line.
pub fn run() -> Result<()> {
    let debug_mode = std::env::var("PLAYTALLY_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // RUST_LOG still takes precedence over the default level
    env_logger::Builder::new()
        .filter_level(if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    info!("playtally starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(serve())
}

async fn serve() -> Result<()> {
    let data_dir = std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
    let mut settings = settings_store.settings();
    settings.apply_env();
    let account_id = settings.account_id.clone().ok_or_else(|| {
        anyhow!(
            "no account configured; set accountId in {} or PLAYTALLY_ACCOUNT_ID",
            settings_store.path().display()
        )
    })?;

    let database = Database::new(data_dir.join("playtally.sqlite3"))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let presence = Arc::new(HttpPresenceSource::new(
        settings.presence_url.clone(),
        clock.clone(),
    )?);

    let engine = ReconciliationEngine::open(
        account_id,
        settings.engine_config(),
        presence,
        Arc::new(database.clone()),
        clock,
    )
    .await;

    let (monitor, events) = lifecycle::channel(AppPhase::Active);
    let mut scheduler = Scheduler::new(engine.clone());
    scheduler.start(events)?;

    let status_task = tokio::spawn(report_status(engine.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(err) = handle_command(line.trim(), &monitor, &engine, &database).await {
                        warn!("{err:#}");
                    }
                }
                Ok(None) => {
                    info!("stdin closed; running until Ctrl-C");
                    stdin_open = false;
                }
                Err(err) => {
                    warn!("failed to read stdin: {err}");
                    stdin_open = false;
                }
            },
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    warn!("failed to listen for Ctrl-C: {err}");
                }
                info!("shutting down");
                break;
            }
        }
    }

    let result = scheduler.stop().await;
    status_task.abort();
    result
}

async fn handle_command(
    command: &str,
    monitor: &LifecycleMonitor,
    engine: &ReconciliationEngine,
    database: &Database,
) -> Result<()> {
    match command {
        "" => Ok(()),
        "status" => {
            let diagnostics = engine.diagnostics().await;
            println!("{}", serde_json::to_string_pretty(&engine.status())?);
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            Ok(())
        }
        "days" => {
            for key in database.list_keys(DAY_LOG_PREFIX).await? {
                println!("{}", key.trim_start_matches(DAY_LOG_PREFIX));
            }
            Ok(())
        }
        command if command.starts_with("day ") => {
            let raw = command.trim_start_matches("day ").trim();
            let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("invalid date '{raw}'"))?;
            match engine.day_log(models::DayKey::new(date)).await? {
                Some(log) => println!("{}", serde_json::to_string_pretty(&log)?),
                None => println!("no log for {raw}"),
            }
            Ok(())
        }
        phase => {
            let phase: AppPhase = phase.parse()?;
            if let Some(event) = monitor.report_and_wait(phase).await? {
                info!("handled {event:?}");
            }
            Ok(())
        }
    }
}

async fn report_status(mut status: tokio::sync::watch::Receiver<EngineStatus>) {
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        match &current.last_error {
            Some(err) => warn!("status: {} (error: {err})", current.total_duration_text),
            None => info!(
                "status: {} playing {}",
                current.total_duration_text,
                current.current_activity_name.as_deref().unwrap_or("nothing")
            ),
        }
    }
}
