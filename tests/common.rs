use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxgate::store::AuthStore;
use voxgate::tools::catalog::{
    AuthSpec, BoxFuture, FunctionDecl, OAuth2Spec, Tool, ToolDescriptor,
};
use voxgate::tools::invocation::{ToolCtx, ToolResult};
use voxgate::vault::{Vault, VaultKey};

/// Temp-dir-backed store with the dev vault key. Keep the TempDir alive so
/// the database isn't deleted until struct drop.
pub struct TestStore {
    _tmp: TempDir,
    pub store: Arc<AuthStore>,
}

impl TestStore {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let store = Arc::new(
            AuthStore::open(&tmp.path().join("voxgate.db"), Vault::new(VaultKey::dev()))
                .expect("failed to open store"),
        );
        Self { _tmp: tmp, store }
    }
}

/// OAuth2 tool whose token endpoint can be pointed at a mock server.
pub struct FakeOAuthTool {
    pub tool_name: String,
    pub token_url: String,
}

impl Tool for FakeOAuthTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.tool_name.clone(),
            description: "test oauth2 tool".to_string(),
            functions: vec![FunctionDecl::new(
                "ping",
                "Reply with the injected token.",
                json!({"type": "object", "properties": {}}),
            )],
            auth: AuthSpec::OAuth2(OAuth2Spec {
                provider: "acme".to_string(),
                authorize_url: "https://auth.acme.test/authorize".to_string(),
                token_url: self.token_url.clone(),
                scopes: vec!["acme.all".to_string()],
            }),
        }
    }

    fn invoke<'a>(
        &'a self,
        _function: &'a str,
        ctx: &'a ToolCtx,
        _args: &'a Value,
    ) -> BoxFuture<'a, ToolResult> {
        Box::pin(async move { ToolResult::ok(ctx.access_token().unwrap_or("-").to_string()) })
    }
}

/// Mock OAuth token endpoint.
pub struct MockTokenEndpoint {
    pub server: MockServer,
}

impl MockTokenEndpoint {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn token_url(&self, endpoint_path: &str) -> String {
        format!("{}{}", self.server.uri(), endpoint_path)
    }

    /// Mount a successful refresh-token grant, asserting the expected call
    /// count. `body` is returned verbatim.
    pub async fn grant(&self, endpoint_path: &str, body: Value, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(endpoint_path))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Mount a provider rejection.
    pub async fn reject(&self, endpoint_path: &str) {
        Mock::given(method("POST"))
            .and(path(endpoint_path))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&self.server)
            .await;
    }
}
