use std::path::PathBuf;
use std::process::ExitCode;

use wow_sync::config;
use wow_sync::{BackgroundSync, SyncEngine};

const DEFAULT_CONFIG_PATH: &str = "./wow-sync.toml";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WOW_SYNC_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Could not load {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if !config_path.exists() {
        match config::save_config(&config_path, &config) {
            Ok(()) => log::info!("Wrote default config to {}", config_path.display()),
            Err(e) => log::warn!("Could not write {}: {}", config_path.display(), e),
        }
    }

    let engine = match SyncEngine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Could not start the sync engine: {}", e.user_message());
            return ExitCode::FAILURE;
        }
    };

    let token = std::env::var("WOW_AUTH_TOKEN").ok();
    if !engine.update_credential(token.as_deref()) {
        log::warn!("WOW_AUTH_TOKEN not set, queues are kept until a credential arrives");
    }

    match engine.health() {
        Ok(health) => log::info!(
            "Primary queue: {} entries, dependent queue: {} entries, {} staged",
            health.primary_queue.length,
            health.dependent_queue.length,
            health.staged_dependency_count
        ),
        Err(e) => log::warn!("Health check failed: {}", e),
    }

    let sync = BackgroundSync::new(engine);
    let Some(handle) = sync.start() else {
        return ExitCode::FAILURE;
    };
    if handle.join().is_err() {
        log::error!("Background sync thread panicked");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
