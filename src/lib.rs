pub mod bracket;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;

use std::fs;

use bracket::{Bracket, TopologyTable};
use config::*;
use server::BracketService;
use store::{JsonFileStore, MatchStore};
use types::AppConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn build_bracket(config: &AppConfig) -> error::Result<Bracket> {
    let table = match topology_path(config) {
        Some(path) => {
            info!("loading topology from {}", path.display());
            TopologyTable::load_from(&path)?
        }
        None => TopologyTable::builtin(config.format, config.alliance_count)?,
    };
    Ok(Bracket::from_table(table)?.with_match_spacing_ms(match_spacing_ms(config)))
}

fn open_store(config: &AppConfig) -> Result<JsonFileStore, String> {
    let path = store_path(config);
    let mut store = JsonFileStore::open(&path).map_err(|e| format!("open store {}: {e}", path.display()))?;
    for alliance in &config.alliances {
        store
            .upsert_alliance(alliance.clone())
            .map_err(|e| format!("save alliance {}: {e}", alliance.id))?;
    }
    Ok(store)
}

fn start(config: AppConfig) -> Result<(), String> {
    let mut bracket = build_bracket(&config).map_err(|e| e.to_string())?;
    let mut store = open_store(&config)?;
    let elimination_count = store
        .matches_by_type(types::MatchType::Elimination)
        .map_err(|e| e.to_string())?
        .len();
    info!("{elimination_count} elimination matches already stored");

    // A missing alliance leaves the bracket stalled but the service usable.
    if let Err(e) = bracket.update(&mut store, now_ms()) {
        error!("initial bracket update failed: {e}");
    }

    let shared = BracketService::new(bracket, Box::new(store)).into_shared();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("start runtime: {e}"))?;
    runtime.block_on(server::serve(shared, static_dir(&config), &config.listen_addr));
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() {
    load_env_file();

    // Initialize tracing with file output
    let logs_dir = logs_dir();
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "bracketd.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("bracketd starting");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            return;
        }
    };
    log_env_warnings(&config);

    if let Err(e) = start(config) {
        error!("{e}");
        eprintln!("{e}");
    }
}
