pub mod console;
pub mod content;
pub mod diagnostics;
pub mod gateway;
pub mod lifecycle;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod settings;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use console::{spawn_event_printer, Console};
use content::ContentFeed;
use gateway::local::LocalBackend;
use gateway::url::UrlOpener;
use gateway::Gateway;
use lifecycle::LifecycleBridge;
use notifications::NotificationBridge;
use scheduler::SessionScheduler;
use settings::SettingsStore;

fn data_dir() -> PathBuf {
    std::env::var_os("CAZZMACHINE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn serve() -> anyhow::Result<()> {
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
    let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);

    let gateway = Gateway::new(Arc::new(LocalBackend::new()));
    match gateway.trigger_crawl().await {
        Ok(fetched) => log::info!("Seeded local backend with {fetched} items"),
        Err(err) => log::warn!("Initial crawl failed: {err:#}"),
    }

    let scheduler = SessionScheduler::new(gateway.clone(), settings.scheduler());
    scheduler.load_persisted_preferences().await;
    scheduler.refresh_stats().await;

    let cancel = CancellationToken::new();
    let (commands, command_rx) = crate::scheduler::commands::channel();
    let command_loop = tokio::spawn(scheduler.clone().run_commands(command_rx, cancel.clone()));
    let printer = spawn_event_printer(scheduler.subscribe(), cancel.clone());

    let lifecycle = LifecycleBridge::new(
        gateway.clone(),
        scheduler.clone(),
        commands.clone(),
        settings.clone(),
    );
    lifecycle.initialize(Utc::now()).await;
    let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
    let lifecycle_task = lifecycle.spawn(lifecycle_rx, cancel.clone());

    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    let notification_task = NotificationBridge::spawn(notification_rx, commands.clone(), cancel.clone());

    let opener = Arc::new(UrlOpener::standard(gateway.clone()));
    let feed = ContentFeed::new(gateway.clone(), scheduler.clone(), opener);
    let refresh_task = feed.spawn_refresh_loop(cancel.clone());

    if settings.is_first_run() {
        println!("First run: type 'onboard' to finish setup.");
    }

    let console = Console::new(
        gateway,
        scheduler,
        commands,
        feed,
        settings,
        lifecycle_tx,
        notification_tx,
    );
    let result = console
        .run(tokio::io::BufReader::new(tokio::io::stdin()))
        .await;

    cancel.cancel();
    for task in [command_loop, printer, lifecycle_task, notification_task, refresh_task] {
        if let Err(err) = task.await {
            log::warn!("Background task ended abnormally: {err}");
        }
    }
    result
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("CazzMachine starting up...");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(serve()) {
        log::error!("CazzMachine stopped: {err:#}");
        std::process::exit(1);
    }
}
