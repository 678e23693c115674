//! Tool authorization store: per-(tenant, tool) enablement, config, and encrypted credentials.
//!
//! SQLite-backed. One row per (tenant_id, tool_name); credentials are sealed
//! by the vault before they ever touch the database. Store I/O failures
//! propagate as `StoreError`; decryption failures never do — they degrade to
//! an empty credential map ("not authenticated").

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, params};
use serde_json::Value;

use crate::tools::catalog::ToolCatalog;
use crate::vault::{ACCESS_TOKEN, CredentialMap, EXPIRES_AT, Vault};

/// Tokens whose expiry is within this margin are reported as expired to
/// status-facing callers.
pub const CREDENTIAL_STATE_MARGIN_SECS: i64 = 300;

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError(e.to_string())
    }
}

impl From<crate::vault::VaultError> for StoreError {
    fn from(e: crate::vault::VaultError) -> Self {
        StoreError(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One persisted tenant × tool authorization.
#[derive(Debug, Clone)]
pub struct ToolAuthorization {
    pub id: i64,
    pub tenant_id: String,
    pub tool_name: String,
    /// Non-secret settings (e.g. a calendar id). JSON object.
    pub public_config: serde_json::Map<String, Value>,
    /// Vault-sealed credential blob; None means no credential stored.
    pub encrypted_credential: Option<String>,
    /// Functions explicitly disabled for this tenant. Absence means enabled.
    pub unselected_functions: BTreeSet<String>,
    pub is_enabled: bool,
    pub last_refreshed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Derived, never persisted. Computed on demand from the decrypted blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    NotAuthenticated,
    Authenticated,
    Expired,
}

impl std::fmt::Display for CredentialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialState::NotAuthenticated => write!(f, "not_authenticated"),
            CredentialState::Authenticated => write!(f, "authenticated"),
            CredentialState::Expired => write!(f, "expired"),
        }
    }
}

/// Status projection for the administrative UI. Never carries credential
/// material, raw or decrypted.
#[derive(Debug, Clone)]
pub struct AuthorizationStatus {
    pub tool_name: String,
    pub is_enabled: bool,
    pub auth_status: CredentialState,
    pub token_expires_at: Option<i64>,
}

/// Parameters for an administrative upsert.
///
/// `credential` semantics: `None` leaves any stored blob untouched;
/// `Some(empty map)` clears it ("log out"); `Some(map)` seals and rewrites.
/// `unselected_functions: None` likewise keeps the stored set.
#[derive(Debug, Clone)]
pub struct UpsertAuthorization {
    pub tenant_id: String,
    pub tool_name: String,
    pub public_config: serde_json::Map<String, Value>,
    pub credential: Option<CredentialMap>,
    pub unselected_functions: Option<BTreeSet<String>>,
    pub is_enabled: bool,
}

impl UpsertAuthorization {
    /// Minimal upsert: enable/disable with config, keep credentials as-is.
    pub fn new(tenant_id: &str, tool_name: &str, is_enabled: bool) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            tool_name: tool_name.to_string(),
            public_config: serde_json::Map::new(),
            credential: None,
            unselected_functions: None,
            is_enabled,
        }
    }
}

/// State classification of a decrypted credential map at `now`.
pub fn credential_state_of(credential: &CredentialMap, now: i64) -> CredentialState {
    if credential.get(ACCESS_TOKEN).and_then(Value::as_str).is_none() {
        return CredentialState::NotAuthenticated;
    }
    match credential.get(EXPIRES_AT).and_then(Value::as_i64) {
        // A token without usable expiry data cannot be trusted or refreshed.
        None => CredentialState::NotAuthenticated,
        Some(expires_at) if expires_at - now <= CREDENTIAL_STATE_MARGIN_SECS => {
            CredentialState::Expired
        }
        Some(_) => CredentialState::Authenticated,
    }
}

// ---------------------------------------------------------------------------
// AuthStore
// ---------------------------------------------------------------------------

const SELECT_COLUMNS: &str = "id, tenant_id, tool_name, public_config, encrypted_credential,
     unselected_functions, is_enabled, last_refreshed_at, created_at, updated_at";

/// SQLite-backed authorization store. Owns the vault.
///
/// Uses a single `Mutex<Connection>` — safe to share across async tasks via
/// `Arc<AuthStore>` since all operations take the lock synchronously.
/// (rusqlite `Connection` is `Send` but not `Sync`.)
pub struct AuthStore {
    conn: Mutex<Connection>,
    vault: Vault,
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore").finish_non_exhaustive()
    }
}

impl AuthStore {
    /// Open (or create) the store at `path`. Creates the parent directory if
    /// it does not exist.
    pub fn open(path: &Path, vault: Vault) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError(format!("create_dir_all: {e}")))?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError(format!("open {}: {e}", path.display())))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;",
        )?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            vault,
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tool_authorizations (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id            TEXT    NOT NULL,
                tool_name            TEXT    NOT NULL,
                public_config        TEXT    NOT NULL DEFAULT '{}',
                encrypted_credential TEXT,
                unselected_functions TEXT    NOT NULL DEFAULT '[]',
                is_enabled           INTEGER NOT NULL DEFAULT 0,
                last_refreshed_at    INTEGER,
                created_at           INTEGER NOT NULL,
                updated_at           INTEGER NOT NULL,
                UNIQUE (tenant_id, tool_name)
            );
            CREATE INDEX IF NOT EXISTS idx_tool_auth_tenant_enabled
                ON tool_authorizations(tenant_id, is_enabled);",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert or update the record for (tenant, tool). One atomic statement;
    /// see `UpsertAuthorization` for the partial-update semantics.
    pub fn upsert(&self, up: &UpsertAuthorization) -> Result<ToolAuthorization, StoreError> {
        let sealed: Option<String> = match &up.credential {
            None => None,
            Some(map) => {
                let s = self.vault.seal(map)?;
                // Empty seal is the "cleared" sentinel — persist as NULL.
                if s.is_empty() { None } else { Some(s) }
            }
        };
        let config_json = serde_json::to_string(&up.public_config)
            .map_err(|e| StoreError(format!("serialize public_config: {e}")))?;
        let unselected_json = match &up.unselected_functions {
            Some(set) => Some(
                serde_json::to_string(set)
                    .map_err(|e| StoreError(format!("serialize unselected_functions: {e}")))?,
            ),
            None => None,
        };
        let now = unix_now();

        let conn = self.conn.lock().map_err(|e| StoreError(format!("lock: {e}")))?;

        conn.execute(
            "INSERT INTO tool_authorizations
                 (tenant_id, tool_name, public_config, encrypted_credential,
                  unselected_functions, is_enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, COALESCE(?5, '[]'), ?6, ?7, ?7)
             ON CONFLICT(tenant_id, tool_name) DO UPDATE SET
                 public_config        = excluded.public_config,
                 encrypted_credential = CASE WHEN ?8
                                             THEN excluded.encrypted_credential
                                             ELSE encrypted_credential END,
                 unselected_functions = COALESCE(?5, unselected_functions),
                 is_enabled           = excluded.is_enabled,
                 updated_at           = excluded.updated_at",
            params![
                up.tenant_id,
                up.tool_name,
                config_json,
                sealed,
                unselected_json,
                up.is_enabled,
                now,
                up.credential.is_some(),
            ],
        )?;

        Self::get_locked(&conn, &up.tenant_id, &up.tool_name)?
            .ok_or_else(|| StoreError("upsert: row vanished after write".into()))
    }

    /// Persist a scheduler-refreshed credential: rewrites only the sealed
    /// blob, `last_refreshed_at`, and `updated_at`. No-op if the record was
    /// deleted since the scan.
    pub fn record_refreshed(
        &self,
        tenant_id: &str,
        tool_name: &str,
        credential: &CredentialMap,
        now: i64,
    ) -> Result<(), StoreError> {
        let sealed = self.vault.seal(credential)?;
        let sealed: Option<String> = if sealed.is_empty() { None } else { Some(sealed) };
        let conn = self.conn.lock().map_err(|e| StoreError(format!("lock: {e}")))?;
        conn.execute(
            "UPDATE tool_authorizations
             SET encrypted_credential = ?3, last_refreshed_at = ?4, updated_at = ?4
             WHERE tenant_id = ?1 AND tool_name = ?2",
            params![tenant_id, tool_name, sealed, now],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(
        &self,
        tenant_id: &str,
        tool_name: &str,
    ) -> Result<Option<ToolAuthorization>, StoreError> {
        let conn = self.conn.lock().map_err(|e| StoreError(format!("lock: {e}")))?;
        Self::get_locked(&conn, tenant_id, tool_name)
    }

    fn get_locked(
        conn: &Connection,
        tenant_id: &str,
        tool_name: &str,
    ) -> Result<Option<ToolAuthorization>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM tool_authorizations
             WHERE tenant_id = ?1 AND tool_name = ?2"
        );
        match conn.query_row(&sql, params![tenant_id, tool_name], row_to_record) {
            Ok(rec) => Ok(Some(rec)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError(e.to_string())),
        }
    }

    /// Enabled authorizations of one tenant, ordered by tool name so call
    /// snapshots are stable.
    pub fn list_enabled(&self, tenant_id: &str) -> Result<Vec<ToolAuthorization>, StoreError> {
        let conn = self.conn.lock().map_err(|e| StoreError(format!("lock: {e}")))?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM tool_authorizations
             WHERE tenant_id = ?1 AND is_enabled = 1
             ORDER BY tool_name ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let records: Vec<ToolAuthorization> = stmt
            .query_map(params![tenant_id], row_to_record)?
            .collect::<Result<_, _>>()?;
        Ok(records)
    }

    /// All records, across tenants, whose tool authenticates via OAuth2 per
    /// the catalog — regardless of enabled state, so disabled tools keep
    /// their credentials fresh and re-enabling is instant.
    pub fn list_requiring_refresh_check(
        &self,
        catalog: &ToolCatalog,
    ) -> Result<Vec<ToolAuthorization>, StoreError> {
        let names = catalog.oauth2_tool_names();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM tool_authorizations
             WHERE tool_name IN ({placeholders})
             ORDER BY tenant_id ASC, tool_name ASC"
        );
        let conn = self.conn.lock().map_err(|e| StoreError(format!("lock: {e}")))?;
        let mut stmt = conn.prepare(&sql)?;
        let records: Vec<ToolAuthorization> = stmt
            .query_map(rusqlite::params_from_iter(names.iter()), row_to_record)?
            .collect::<Result<_, _>>()?;
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    /// Decrypt a record's credential blob. Missing blob or failed decrypt
    /// both yield an empty map.
    pub fn decrypt_credential(&self, record: &ToolAuthorization) -> CredentialMap {
        match record.encrypted_credential.as_deref() {
            Some(blob) => self.vault.open(blob),
            None => CredentialMap::new(),
        }
    }

    /// Status-facing credential state (5-minute safety margin). The refresh
    /// scheduler deliberately does NOT use this — it checks the raw expiry
    /// against its own window so expired-but-refreshable tokens are still
    /// refreshed.
    pub fn credential_state(&self, record: &ToolAuthorization) -> CredentialState {
        self.credential_state_at(record, unix_now())
    }

    pub fn credential_state_at(&self, record: &ToolAuthorization, now: i64) -> CredentialState {
        credential_state_of(&self.decrypt_credential(record), now)
    }

    /// Projection for the administrative UI.
    pub fn status(&self, record: &ToolAuthorization) -> AuthorizationStatus {
        let credential = self.decrypt_credential(record);
        AuthorizationStatus {
            tool_name: record.tool_name.clone(),
            is_enabled: record.is_enabled,
            auth_status: credential_state_of(&credential, unix_now()),
            token_expires_at: credential.get(EXPIRES_AT).and_then(Value::as_i64),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Corrupt JSON in a column is a store error, surfaced through rusqlite's
/// conversion-failure variant so row mapping composes with query_map.
fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ToolAuthorization> {
    Ok(ToolAuthorization {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        tool_name: row.get(2)?,
        public_config: json_column(row, 3)?,
        encrypted_credential: row.get(4)?,
        unselected_functions: json_column(row, 5)?,
        is_enabled: row.get(6)?,
        last_refreshed_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::catalog::test_support::EchoTool;
    use crate::vault::{REFRESH_TOKEN, VaultKey};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, AuthStore) {
        let tmp = TempDir::new().unwrap();
        let store = AuthStore::open(
            &tmp.path().join("voxgate.db"),
            Vault::new(VaultKey::dev()),
        )
        .unwrap();
        (tmp, store)
    }

    fn cred(access: &str, refresh: Option<&str>, expires_at: i64) -> CredentialMap {
        let mut m = CredentialMap::new();
        m.insert(ACCESS_TOKEN.into(), json!(access));
        if let Some(r) = refresh {
            m.insert(REFRESH_TOKEN.into(), json!(r));
        }
        m.insert(EXPIRES_AT.into(), json!(expires_at));
        m
    }

    // ── Open & schema ────────────────────────────────────────────────────────

    #[test]
    fn open_idempotent_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("voxgate.db");
        {
            AuthStore::open(&path, Vault::new(VaultKey::dev())).unwrap();
        }
        // Reopen — schema init must be safe with IF NOT EXISTS
        let store = AuthStore::open(&path, Vault::new(VaultKey::dev())).unwrap();
        assert!(store.get("t", "tool").unwrap().is_none());
    }

    // ── Upsert semantics ─────────────────────────────────────────────────────

    #[test]
    fn upsert_inserts_then_updates_in_place() {
        let (_tmp, store) = temp_store();
        let mut up = UpsertAuthorization::new("tenant-a", "calendar", true);
        up.public_config
            .insert("calendar_id".into(), json!("primary"));

        let created = store.upsert(&up).unwrap();
        assert!(created.is_enabled);
        assert_eq!(created.public_config["calendar_id"], json!("primary"));
        assert!(created.encrypted_credential.is_none());

        up.is_enabled = false;
        let updated = store.upsert(&up).unwrap();
        assert_eq!(updated.id, created.id);
        assert!(!updated.is_enabled);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn at_most_one_record_per_tenant_tool() {
        let (_tmp, store) = temp_store();
        let up = UpsertAuthorization::new("tenant-a", "mail", true);
        store.upsert(&up).unwrap();
        store.upsert(&up).unwrap();
        store
            .upsert(&UpsertAuthorization::new("tenant-b", "mail", true))
            .unwrap();

        assert_eq!(store.list_enabled("tenant-a").unwrap().len(), 1);
        assert_eq!(store.list_enabled("tenant-b").unwrap().len(), 1);
    }

    #[test]
    fn credential_none_keeps_existing_blob() {
        let (_tmp, store) = temp_store();
        let mut up = UpsertAuthorization::new("t", "mail", true);
        up.credential = Some(cred("tok", Some("ref"), unix_now() + 3600));
        let with_cred = store.upsert(&up).unwrap();
        assert!(with_cred.encrypted_credential.is_some());

        // Admin flips enabled without resending the credential.
        up.credential = None;
        up.is_enabled = false;
        let updated = store.upsert(&up).unwrap();
        assert_eq!(updated.encrypted_credential, with_cred.encrypted_credential);
        assert_eq!(
            store.decrypt_credential(&updated)[ACCESS_TOKEN],
            json!("tok")
        );
    }

    #[test]
    fn explicit_empty_credential_clears_blob() {
        let (_tmp, store) = temp_store();
        let mut up = UpsertAuthorization::new("t", "mail", true);
        up.credential = Some(cred("tok", None, unix_now() + 3600));
        store.upsert(&up).unwrap();

        // "Log out": explicit empty map.
        up.credential = Some(CredentialMap::new());
        let cleared = store.upsert(&up).unwrap();
        assert!(cleared.encrypted_credential.is_none());
        assert!(store.decrypt_credential(&cleared).is_empty());
    }

    #[test]
    fn unselected_functions_partial_update() {
        let (_tmp, store) = temp_store();
        let mut up = UpsertAuthorization::new("t", "mail", true);
        up.unselected_functions = Some(["send".to_string()].into_iter().collect());
        let rec = store.upsert(&up).unwrap();
        assert!(rec.unselected_functions.contains("send"));

        up.unselected_functions = None;
        let kept = store.upsert(&up).unwrap();
        assert!(kept.unselected_functions.contains("send"));

        up.unselected_functions = Some(BTreeSet::new());
        let cleared = store.upsert(&up).unwrap();
        assert!(cleared.unselected_functions.is_empty());
    }

    // ── List queries ─────────────────────────────────────────────────────────

    #[test]
    fn list_enabled_filters_and_orders() {
        let (_tmp, store) = temp_store();
        store
            .upsert(&UpsertAuthorization::new("t", "mail", true))
            .unwrap();
        store
            .upsert(&UpsertAuthorization::new("t", "booking", false))
            .unwrap();
        store
            .upsert(&UpsertAuthorization::new("t", "calendar", true))
            .unwrap();
        store
            .upsert(&UpsertAuthorization::new("other", "mail", true))
            .unwrap();

        let enabled = store.list_enabled("t").unwrap();
        let names: Vec<&str> = enabled.iter().map(|r| r.tool_name.as_str()).collect();
        assert_eq!(names, vec!["calendar", "mail"]);
    }

    #[test]
    fn refresh_check_spans_tenants_and_ignores_enabled_state() {
        let (_tmp, store) = temp_store();
        let catalog = ToolCatalog::new();
        catalog.register(Arc::new(
            EchoTool::new("mail", &["send"]).oauth2("google", "https://g/token"),
        ));
        catalog.register(Arc::new(EchoTool::new("booking", &["list_event_types"])));

        store
            .upsert(&UpsertAuthorization::new("a", "mail", true))
            .unwrap();
        store
            .upsert(&UpsertAuthorization::new("b", "mail", false))
            .unwrap();
        store
            .upsert(&UpsertAuthorization::new("a", "booking", true))
            .unwrap();

        let due = store.list_requiring_refresh_check(&catalog).unwrap();
        assert_eq!(due.len(), 2, "both tenants' mail rows, booking excluded");
        assert!(due.iter().all(|r| r.tool_name == "mail"));
    }

    #[test]
    fn refresh_check_empty_catalog_is_empty() {
        let (_tmp, store) = temp_store();
        store
            .upsert(&UpsertAuthorization::new("a", "mail", true))
            .unwrap();
        let catalog = ToolCatalog::new();
        assert!(store.list_requiring_refresh_check(&catalog).unwrap().is_empty());
    }

    // ── Credential state ─────────────────────────────────────────────────────

    #[test]
    fn credential_state_margin_boundaries() {
        let now = 1_000_000;
        // margin = 300 s, enumerated:
        let healthy = cred("tok", None, now + 301);
        assert_eq!(credential_state_of(&healthy, now), CredentialState::Authenticated);

        let on_margin = cred("tok", None, now + 300);
        assert_eq!(credential_state_of(&on_margin, now), CredentialState::Expired);

        let past = cred("tok", None, now - 10);
        assert_eq!(credential_state_of(&past, now), CredentialState::Expired);

        assert_eq!(
            credential_state_of(&CredentialMap::new(), now),
            CredentialState::NotAuthenticated
        );

        let mut no_expiry = CredentialMap::new();
        no_expiry.insert(ACCESS_TOKEN.into(), json!("tok"));
        assert_eq!(
            credential_state_of(&no_expiry, now),
            CredentialState::NotAuthenticated
        );
    }

    #[test]
    fn decryption_failure_degrades_to_not_authenticated() {
        let (_tmp, store) = temp_store();
        let mut up = UpsertAuthorization::new("t", "mail", true);
        up.credential = Some(cred("tok", None, unix_now() + 3600));
        let mut rec = store.upsert(&up).unwrap();

        // Simulate a blob written under a different key.
        rec.encrypted_credential = Some("enc:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".into());
        assert!(store.decrypt_credential(&rec).is_empty());
        assert_eq!(
            store.credential_state(&rec),
            CredentialState::NotAuthenticated
        );
    }

    // ── Status projection ────────────────────────────────────────────────────

    #[test]
    fn status_projection_has_no_secrets() {
        let (_tmp, store) = temp_store();
        let expires = unix_now() + 3600;
        let mut up = UpsertAuthorization::new("t", "calendar", true);
        up.credential = Some(cred("secret-token", Some("secret-refresh"), expires));
        let rec = store.upsert(&up).unwrap();

        let status = store.status(&rec);
        assert_eq!(status.tool_name, "calendar");
        assert!(status.is_enabled);
        assert_eq!(status.auth_status, CredentialState::Authenticated);
        assert_eq!(status.token_expires_at, Some(expires));
    }

    // ── Scheduler write path ─────────────────────────────────────────────────

    #[test]
    fn record_refreshed_rewrites_blob_and_stamp() {
        let (_tmp, store) = temp_store();
        let mut up = UpsertAuthorization::new("t", "mail", true);
        up.credential = Some(cred("old", Some("ref"), 100));
        store.upsert(&up).unwrap();

        let now = unix_now();
        store
            .record_refreshed("t", "mail", &cred("new", Some("ref"), now + 3600), now)
            .unwrap();

        let rec = store.get("t", "mail").unwrap().unwrap();
        assert_eq!(rec.last_refreshed_at, Some(now));
        assert_eq!(store.decrypt_credential(&rec)[ACCESS_TOKEN], json!("new"));
    }

    #[test]
    fn record_refreshed_missing_row_is_noop() {
        let (_tmp, store) = temp_store();
        store
            .record_refreshed("ghost", "mail", &cred("x", None, 0), unix_now())
            .unwrap();
        assert!(store.get("ghost", "mail").unwrap().is_none());
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    #[test]
    fn data_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("voxgate.db");
        {
            let store = AuthStore::open(&path, Vault::new(VaultKey::dev())).unwrap();
            let mut up = UpsertAuthorization::new("t", "mail", true);
            up.credential = Some(cred("tok", Some("ref"), 9_999_999_999));
            store.upsert(&up).unwrap();
        }
        let store = AuthStore::open(&path, Vault::new(VaultKey::dev())).unwrap();
        let rec = store.get("t", "mail").unwrap().unwrap();
        assert_eq!(store.decrypt_credential(&rec)[ACCESS_TOKEN], json!("tok"));
    }
}
