//! voxgate — tool authorization & call-session daemon for the voice-agent platform.
//!
//! Single binary: opens the authorization store, builds the tool catalog,
//! runs the credential refresh scheduler and the idle-session sweeper until
//! ctrl-c. The web API, telephony bridge, and conversational engine are
//! separate services consuming this crate's library surface.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use voxgate::config;
use voxgate::oauth::ProviderRegistry;
use voxgate::refresher::RefreshScheduler;
use voxgate::session::{self, SessionManager};
use voxgate::store::AuthStore;
use voxgate::tools;
use voxgate::vault::{Vault, VaultKey};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    info!("voxgate {}", env!("CARGO_PKG_VERSION"));

    let path = config::default_config_path();
    let cfg = match config::load(&path) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let key = match VaultKey::from_env() {
        Ok(Some(k)) => k,
        Ok(None) => {
            warn!(
                "{} not set; using the deterministic development key — never deploy like this",
                voxgate::vault::VAULT_KEY_ENV
            );
            VaultKey::dev()
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let store = match AuthStore::open(&PathBuf::from(cfg.database_path()), Vault::new(key)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("authorization store: {}", cfg.database_path());

    let catalog = Arc::new(tools::build_catalog());
    info!("tool catalog: {}", catalog.list().join(", "));

    let sessions = Arc::new(SessionManager::new(Arc::clone(&store)));
    session::spawn_idle_sweeper(
        Arc::clone(&sessions),
        cfg.sweep_interval(),
        cfg.idle_timeout(),
    );

    let scheduler = match RefreshScheduler::new(
        store,
        catalog,
        Arc::new(ProviderRegistry::builtin()),
        cfg.refresh_config(),
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    scheduler.start();

    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to listen for shutdown signal");
    }
    info!("shutting down");
    scheduler.stop().await;
}
