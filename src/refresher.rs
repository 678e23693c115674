//! Refresh loop: scan oauth2 authorizations, refresh credentials entering the expiry window.
//!
//! One periodic task, records refreshed sequentially within a tick to bound
//! load on the store and on upstream providers. Runs concurrently with all
//! call-serving activity; a call's snapshot is never touched by a refresh.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::oauth::{self, OAuthError, ProviderRegistry};
use crate::store::{AuthStore, StoreError, ToolAuthorization, unix_now};
use crate::tools::catalog::ToolCatalog;
use crate::vault::{ACCESS_TOKEN, EXPIRES_AT, REFRESH_TOKEN};

/// Sleep after a tick-level failure before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Scheduler timing. Defaults: check every 5 minutes, refresh anything
/// expiring within 15 minutes.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub check_interval: Duration,
    pub expiry_window: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5 * 60),
            expiry_window: Duration::from_secs(15 * 60),
        }
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background credential refresher. Two states: stopped (no task) and
/// running (task + shutdown handle stored). `start`/`stop` are idempotent.
pub struct RefreshScheduler {
    store: Arc<AuthStore>,
    catalog: Arc<ToolCatalog>,
    providers: Arc<ProviderRegistry>,
    client: reqwest::Client,
    config: RefreshConfig,
    running: Mutex<Option<RunningLoop>>,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<AuthStore>,
        catalog: Arc<ToolCatalog>,
        providers: Arc<ProviderRegistry>,
        config: RefreshConfig,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            store,
            catalog,
            providers,
            client: oauth::token_client()?,
            config,
            running: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("scheduler lock").is_some()
    }

    /// Launch the periodic loop. No-op when already running.
    pub fn start(&self) {
        let mut guard = self.running.lock().expect("scheduler lock");
        if guard.is_some() {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(refresh_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.catalog),
            Arc::clone(&self.providers),
            self.client.clone(),
            self.config.clone(),
            shutdown_rx,
        ));
        *guard = Some(RunningLoop { shutdown, handle });
        info!(
            "refresh scheduler started (interval {}s, window {}s)",
            self.config.check_interval.as_secs(),
            self.config.expiry_window.as_secs()
        );
    }

    /// Signal the loop and await its termination. Cancels an in-flight sleep
    /// immediately; an in-flight refresh call finishes or times out naturally
    /// so no partial credential update is left behind. No-op when stopped.
    pub async fn stop(&self) {
        let running = self.running.lock().expect("scheduler lock").take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(true);
        if running.handle.await.is_err() {
            warn!("refresh scheduler task panicked during shutdown");
        }
        info!("refresh scheduler stopped");
    }
}

async fn refresh_loop(
    store: Arc<AuthStore>,
    catalog: Arc<ToolCatalog>,
    providers: Arc<ProviderRegistry>,
    client: reqwest::Client,
    config: RefreshConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let expiry_window_secs = config.expiry_window.as_secs() as i64;
    let mut interval = tokio::time::interval(config.check_interval);
    // Skip the immediately-firing first tick so the first real tick is one
    // full interval out.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => return,
        }
        match tick_once(&store, &catalog, &providers, &client, expiry_window_secs, unix_now()).await
        {
            Ok(outcome) => {
                if outcome.refreshed > 0 {
                    info!(
                        "refresh tick: {} checked, {} refreshed",
                        outcome.checked, outcome.refreshed
                    );
                }
            }
            Err(e) => {
                warn!("refresh tick failed: {e}; backing off {}s", ERROR_BACKOFF.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

/// Per-tick counts, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub checked: usize,
    pub refreshed: usize,
}

/// Run one refresh pass. Used by the loop and directly by tests.
///
/// A single record's failure never aborts the pass; only the store scan
/// itself can fail.
pub async fn tick_once(
    store: &AuthStore,
    catalog: &ToolCatalog,
    providers: &ProviderRegistry,
    client: &reqwest::Client,
    expiry_window_secs: i64,
    now: i64,
) -> Result<TickOutcome, StoreError> {
    let records = store.list_requiring_refresh_check(catalog)?;
    let mut outcome = TickOutcome {
        checked: records.len(),
        refreshed: 0,
    };
    for record in &records {
        if refresh_record(store, catalog, providers, client, expiry_window_secs, now, record).await
        {
            outcome.refreshed += 1;
        }
    }
    Ok(outcome)
}

/// Refresh one record if it is due. Returns true when a new credential was
/// persisted.
async fn refresh_record(
    store: &AuthStore,
    catalog: &ToolCatalog,
    providers: &ProviderRegistry,
    client: &reqwest::Client,
    expiry_window_secs: i64,
    now: i64,
    record: &ToolAuthorization,
) -> bool {
    let credential = store.decrypt_credential(record);
    if credential.is_empty() {
        // Never authenticated (or unreadable blob) — nothing to keep fresh.
        return false;
    }
    let Some(refresh_token) = credential.get(REFRESH_TOKEN).and_then(Value::as_str) else {
        debug!(
            "{}/{}: no refresh token; skipping",
            record.tenant_id, record.tool_name
        );
        return false;
    };
    let Some(descriptor) = catalog.lookup(&record.tool_name) else {
        warn!(
            "{}/{}: tool no longer deployed; skipping refresh",
            record.tenant_id, record.tool_name
        );
        return false;
    };
    let Some(spec) = descriptor.oauth2().cloned() else {
        // The scan filters on oauth2 tools; a re-registered descriptor could
        // have changed auth type since.
        return false;
    };
    let Some(creds) = providers.resolve(&spec.provider) else {
        warn!(
            "{}/{}: no client credentials for provider '{}'; skipping refresh",
            record.tenant_id, record.tool_name, spec.provider
        );
        return false;
    };
    let Some(expires_at) = credential.get(EXPIRES_AT).and_then(Value::as_i64) else {
        // A refresh token with no usable expiry: there is no window to
        // compute, so leave it for a human to re-authenticate.
        warn!(
            "{}/{}: credential has no expiry; re-authentication required",
            record.tenant_id, record.tool_name
        );
        return false;
    };
    if expires_at - now > expiry_window_secs {
        return false; // not due yet
    }
    // Note: already-past expiry still lands here on purpose — the refresh
    // token usually outlives the access token.

    match oauth::refresh_access_token(client, &spec.token_url, &creds, refresh_token, now).await {
        Ok(token) => {
            let mut updated = credential.clone();
            updated.insert(ACCESS_TOKEN.into(), json!(token.access_token));
            if let Some(rotated) = token.refresh_token {
                updated.insert(REFRESH_TOKEN.into(), json!(rotated));
            }
            updated.insert(EXPIRES_AT.into(), json!(token.expires_at));
            match store.record_refreshed(&record.tenant_id, &record.tool_name, &updated, now) {
                Ok(()) => {
                    info!(
                        "{}/{}: credential refreshed (expires_at {})",
                        record.tenant_id, record.tool_name, token.expires_at
                    );
                    true
                }
                Err(e) => {
                    warn!(
                        "{}/{}: refreshed but failed to persist: {e}",
                        record.tenant_id, record.tool_name
                    );
                    false
                }
            }
        }
        Err(e) => {
            warn!(
                "{}/{}: token refresh failed: {e}",
                record.tenant_id, record.tool_name
            );
            false
        }
    }
}
