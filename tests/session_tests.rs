use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxgate::binder::bind;
use voxgate::session::SessionManager;
use voxgate::store::UpsertAuthorization;
use voxgate::tools;
use voxgate::vault::{API_KEY, CredentialMap};

mod common;
use common::TestStore;

fn enable_with_credential(ts: &TestStore, tool: &str, credential: CredentialMap) {
    let mut up = UpsertAuthorization::new("tenant-a", tool, true);
    up.credential = Some(credential);
    ts.store.upsert(&up).unwrap();
}

fn token_credential(token: &str) -> CredentialMap {
    let mut m = CredentialMap::new();
    m.insert(voxgate::vault::ACCESS_TOKEN.into(), json!(token));
    m
}

#[test]
fn snapshot_contains_only_enabled_tools_and_binding_respects_opt_outs() {
    let ts = TestStore::new();
    let catalog = tools::build_catalog();
    let manager = SessionManager::new(Arc::clone(&ts.store));

    // Tool A enabled (mail: 2 functions), Tool B disabled.
    enable_with_credential(&ts, "mail", token_credential("tok"));
    ts.store
        .upsert(&UpsertAuthorization::new("tenant-a", "calendar", false))
        .unwrap();

    let snapshot = manager.start_session("tenant-a").unwrap();
    assert_eq!(snapshot.tools.len(), 1);
    assert_eq!(snapshot.tools[0].authorization.tool_name, "mail");

    let bound = bind(&snapshot, &catalog);
    assert_eq!(bound.len(), 2);

    // Opt out of send_message; a fresh call sees exactly one callable.
    let mut up = UpsertAuthorization::new("tenant-a", "mail", true);
    up.unselected_functions = Some(
        ["send_message".to_string()]
            .into_iter()
            .collect::<BTreeSet<_>>(),
    );
    ts.store.upsert(&up).unwrap();

    let next = manager.start_session("tenant-a").unwrap();
    let bound = bind(&next, &catalog);
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0].name, "search_messages");
}

#[test]
fn binding_a_snapshot_is_unchanged_by_later_store_mutations() {
    let ts = TestStore::new();
    let catalog = tools::build_catalog();
    let manager = SessionManager::new(Arc::clone(&ts.store));

    enable_with_credential(&ts, "mail", token_credential("token-at-T"));

    // T: capture.
    let snapshot = manager.start_session("tenant-a").unwrap();

    // T+1: disable the tool and rotate its credential.
    let mut up = UpsertAuthorization::new("tenant-a", "mail", false);
    up.credential = Some(token_credential("token-at-T-plus-1"));
    ts.store.upsert(&up).unwrap();

    // T+2: the snapshot still binds exactly as at T.
    let bound = bind(&snapshot, &catalog);
    assert_eq!(bound.len(), 2);
    assert_eq!(
        snapshot.tools[0].credential[voxgate::vault::ACCESS_TOKEN],
        json!("token-at-T")
    );

    // A new call reflects the latest state.
    let next = manager.start_session("tenant-a").unwrap();
    assert!(next.tools.is_empty());
    assert!(bind(&next, &catalog).is_empty());
}

#[test]
fn stale_opt_out_name_does_not_affect_current_functions() {
    let ts = TestStore::new();
    let catalog = tools::build_catalog();
    let manager = SessionManager::new(Arc::clone(&ts.store));

    let mut up = UpsertAuthorization::new("tenant-a", "mail", true);
    up.credential = Some(token_credential("tok"));
    up.unselected_functions = Some(
        ["legacy_fn".to_string()].into_iter().collect::<BTreeSet<_>>(),
    );
    ts.store.upsert(&up).unwrap();

    let snapshot = manager.start_session("tenant-a").unwrap();
    let bound = bind(&snapshot, &catalog);
    // legacy_fn no longer exists; both current functions bind.
    assert_eq!(bound.len(), 2);
}

#[test]
fn authorization_for_an_undeployed_tool_is_skipped() {
    let ts = TestStore::new();
    let catalog = tools::build_catalog();
    let manager = SessionManager::new(Arc::clone(&ts.store));

    enable_with_credential(&ts, "mail", token_credential("tok"));
    // A tool that was removed from the deployment since it was authorized.
    ts.store
        .upsert(&UpsertAuthorization::new("tenant-a", "fax_machine", true))
        .unwrap();

    let snapshot = manager.start_session("tenant-a").unwrap();
    assert_eq!(snapshot.tools.len(), 2);

    let bound = bind(&snapshot, &catalog);
    assert!(bound.iter().all(|b| b.tool_name == "mail"));
    assert_eq!(bound.len(), 2);
}

#[tokio::test]
async fn invocation_uses_the_snapshot_credential_even_after_rotation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/event_types"))
        .and(header("authorization", "Bearer key-v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"collection": []})))
        .expect(1)
        .mount(&server)
        .await;

    let ts = TestStore::new();
    let catalog = tools::build_catalog();
    let manager = SessionManager::new(Arc::clone(&ts.store));

    let mut credential = CredentialMap::new();
    credential.insert(API_KEY.into(), json!("key-v1"));
    let mut up = UpsertAuthorization::new("tenant-a", "booking", true);
    up.credential = Some(credential);
    up.public_config.insert("api_base".into(), json!(server.uri()));
    ts.store.upsert(&up).unwrap();

    let snapshot = manager.start_session("tenant-a").unwrap();
    let bound = bind(&snapshot, &catalog);
    let list_event_types = bound
        .iter()
        .find(|b| b.name == "list_event_types")
        .expect("bound function");

    // Rotate the stored key mid-call; the in-flight call keeps key-v1.
    let mut rotated = CredentialMap::new();
    rotated.insert(API_KEY.into(), json!("key-v2"));
    let mut up = UpsertAuthorization::new("tenant-a", "booking", true);
    up.credential = Some(rotated);
    up.public_config.insert("api_base".into(), json!(server.uri()));
    ts.store.upsert(&up).unwrap();

    let res = list_event_types.invoke(&json!({})).await;
    assert!(!res.is_error, "invocation failed: {}", res.content);
    assert!(res.content.contains("collection"));

    manager.end_session(&snapshot.session_id);
}
