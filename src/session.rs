//! Call sessions: immutable per-call snapshots of enabled tool authorizations.
//!
//! A snapshot is captured once at call start and never changes afterwards —
//! a call must not observe a tool disappearing or a credential swapping
//! underneath an in-flight conversation. Snapshots are dropped on explicit
//! call end or, as a safety net, by the idle sweeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{AuthStore, StoreError, ToolAuthorization, unix_now};
use crate::vault::CredentialMap;

/// One tool inside a snapshot: the authorization row as captured plus a
/// decrypted credential copy.
#[derive(Debug, Clone)]
pub struct SnapshotTool {
    pub authorization: ToolAuthorization,
    pub credential: CredentialMap,
}

/// Frozen view of a tenant's enabled tools for one call. Immutable after
/// creation; later store mutations never propagate in.
#[derive(Debug)]
pub struct CallSessionSnapshot {
    pub session_id: String,
    pub tenant_id: String,
    pub captured_at: i64,
    /// Ordered by tool name (the store's list order).
    pub tools: Vec<SnapshotTool>,
}

struct SessionEntry {
    snapshot: Arc<CallSessionSnapshot>,
    last_access: AtomicI64,
}

/// In-memory table of active call sessions, shared across all concurrently
/// active calls. Keyed by session id; no call ever needs another call's
/// session, so contention stays low.
pub struct SessionManager {
    store: Arc<AuthStore>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(store: Arc<AuthStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Capture a snapshot of the tenant's enabled tools and register it
    /// under a fresh session id. One store read, one decrypt per record;
    /// sits on the call-setup critical path. A store read failure fails call
    /// setup visibly.
    pub fn start_session(&self, tenant_id: &str) -> Result<Arc<CallSessionSnapshot>, StoreError> {
        let records = self.store.list_enabled(tenant_id)?;
        let now = unix_now();
        let tools = records
            .into_iter()
            .map(|authorization| {
                let credential = self.store.decrypt_credential(&authorization);
                SnapshotTool {
                    authorization,
                    credential,
                }
            })
            .collect();

        let snapshot = Arc::new(CallSessionSnapshot {
            session_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            captured_at: now,
            tools,
        });

        self.sessions.write().expect("session lock").insert(
            snapshot.session_id.clone(),
            SessionEntry {
                snapshot: Arc::clone(&snapshot),
                last_access: AtomicI64::new(now),
            },
        );
        info!(
            "session {} started for tenant {} ({} tools)",
            snapshot.session_id,
            tenant_id,
            snapshot.tools.len()
        );
        Ok(snapshot)
    }

    /// Look up an active session and stamp it as recently used.
    pub fn get_session(&self, session_id: &str) -> Option<Arc<CallSessionSnapshot>> {
        let guard = self.sessions.read().expect("session lock");
        let entry = guard.get(session_id)?;
        entry.last_access.store(unix_now(), Ordering::Relaxed);
        Some(Arc::clone(&entry.snapshot))
    }

    /// Drop a session. Idempotent: removing an absent id is a no-op.
    /// Synchronous and never fails.
    pub fn end_session(&self, session_id: &str) {
        let removed = self
            .sessions
            .write()
            .expect("session lock")
            .remove(session_id);
        if removed.is_some() {
            info!("session {} ended", session_id);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().expect("session lock").len()
    }

    /// Remove sessions idle for longer than `idle_timeout_secs` (calls that
    /// disconnected without a clean end). Returns the number removed.
    pub fn sweep_idle(&self, now: i64, idle_timeout_secs: i64) -> usize {
        let mut guard = self.sessions.write().expect("session lock");
        let before = guard.len();
        guard.retain(|session_id, entry| {
            let idle = now - entry.last_access.load(Ordering::Relaxed);
            if idle > idle_timeout_secs {
                debug!("session {} idle for {}s; sweeping", session_id, idle);
                false
            } else {
                true
            }
        });
        before - guard.len()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("active", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

/// Spawn the idle-session sweeper. Runs `sweep_idle` every `sweep_interval`;
/// the first tick is one full interval out.
pub fn spawn_idle_sweeper(
    manager: Arc<SessionManager>,
    sweep_interval: Duration,
    idle_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    let idle_timeout_secs = idle_timeout.as_secs() as i64;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            let swept = manager.sweep_idle(unix_now(), idle_timeout_secs);
            if swept > 0 {
                info!("idle sweeper removed {} stale session(s)", swept);
            }
        }
    })
}
