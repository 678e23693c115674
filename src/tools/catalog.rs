//! Tool catalog: descriptors by name; declared functions, auth requirements, implementations.
//!
//! Each tool implementation statically declares its function table (name,
//! description, JSON parameter schema) — no runtime reflection. The catalog
//! is built once at process start and is immutable in practice; registration
//! is idempotent by name so a re-scan on hot reload is safe.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::tools::invocation::{ToolCtx, ToolResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single declared callable: name, description, JSON schema for arguments.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionDecl {
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// OAuth2 provider configuration declared by a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Spec {
    /// Provider id resolved against the provider registry (e.g. "google").
    pub provider: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

/// How a tool authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSpec {
    None,
    /// Single secret stored under the given credential-map key.
    ApiKey { credential_key: String },
    OAuth2(OAuth2Spec),
}

/// Immutable description of one tool: logical name, declared functions,
/// authorization requirements.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub functions: Vec<FunctionDecl>,
    pub auth: AuthSpec,
}

impl ToolDescriptor {
    #[inline]
    pub fn requires_auth(&self) -> bool {
        !matches!(self.auth, AuthSpec::None)
    }

    /// OAuth2 configuration if this tool authenticates via OAuth2.
    #[inline]
    pub fn oauth2(&self) -> Option<&OAuth2Spec> {
        match &self.auth {
            AuthSpec::OAuth2(spec) => Some(spec),
            _ => None,
        }
    }

    #[inline]
    pub fn declares_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }
}

/// A tool implementation: a static descriptor plus a dispatcher for its
/// declared functions. Credentials arrive via the ToolCtx, injected from the
/// call snapshot — implementations never fetch credentials themselves.
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;
    fn invoke<'a>(
        &'a self,
        function: &'a str,
        ctx: &'a ToolCtx,
        args: &'a Value,
    ) -> BoxFuture<'a, ToolResult>;
}

struct CatalogEntry {
    descriptor: ToolDescriptor,
    implementation: Arc<dyn Tool>,
}

/// Registry of tools by logical name. Thread-safe; descriptors are captured
/// once at registration and never change afterwards.
#[derive(Default)]
pub struct ToolCatalog {
    inner: RwLock<HashMap<String, CatalogEntry>>,
}

impl ToolCatalog {
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool under its declared name. Overwrites if the name
    /// already exists (last write wins).
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        self.inner.write().expect("catalog lock").insert(
            descriptor.name.clone(),
            CatalogEntry {
                descriptor,
                implementation: tool,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Option<ToolDescriptor> {
        let guard = self.inner.read().expect("catalog lock");
        guard.get(name).map(|e| e.descriptor.clone())
    }

    pub fn implementation(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let guard = self.inner.read().expect("catalog lock");
        guard.get(name).map(|e| Arc::clone(&e.implementation))
    }

    /// Declared functions of a tool, or None if unknown.
    pub fn functions(&self, name: &str) -> Option<Vec<FunctionDecl>> {
        let guard = self.inner.read().expect("catalog lock");
        guard.get(name).map(|e| e.descriptor.functions.clone())
    }

    /// Sorted list of registered tool names.
    pub fn list(&self) -> Vec<String> {
        let guard = self.inner.read().expect("catalog lock");
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted names of tools that authenticate via OAuth2. Drives the
    /// refresh scheduler's store query.
    pub fn oauth2_tool_names(&self) -> Vec<String> {
        let guard = self.inner.read().expect("catalog lock");
        let mut names: Vec<String> = guard
            .values()
            .filter(|e| e.descriptor.oauth2().is_some())
            .map(|e| e.descriptor.name.clone())
            .collect();
        names.sort();
        names
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::EchoTool;
    use super::*;

    #[test]
    fn register_lookup_functions() {
        let catalog = ToolCatalog::new();
        catalog.register(Arc::new(EchoTool::new("calendar", &["list_events", "create_event"])));

        let desc = catalog.lookup("calendar").unwrap();
        assert_eq!(desc.name, "calendar");
        assert!(!desc.requires_auth());
        assert!(desc.declares_function("list_events"));
        assert!(!desc.declares_function("send"));

        let fns = catalog.functions("calendar").unwrap();
        assert_eq!(fns.len(), 2);
        assert!(catalog.lookup("unknown").is_none());
        assert!(catalog.functions("unknown").is_none());
    }

    #[test]
    fn register_is_idempotent_last_write_wins() {
        let catalog = ToolCatalog::new();
        catalog.register(Arc::new(EchoTool::new("mail", &["send"])));
        catalog.register(Arc::new(EchoTool::new("mail", &["send", "search"])));

        assert_eq!(catalog.list(), vec!["mail"]);
        assert_eq!(catalog.functions("mail").unwrap().len(), 2);
    }

    #[test]
    fn oauth2_tool_names_filters_and_sorts() {
        let catalog = ToolCatalog::new();
        catalog.register(Arc::new(
            EchoTool::new("mail", &["send"]).oauth2("google", "https://oauth2.googleapis.com/token"),
        ));
        catalog.register(Arc::new(EchoTool::new("booking", &["list_event_types"])));
        catalog.register(Arc::new(
            EchoTool::new("calendar", &["list_events"])
                .oauth2("google", "https://oauth2.googleapis.com/token"),
        ));

        assert_eq!(catalog.oauth2_tool_names(), vec!["calendar", "mail"]);
    }

    #[tokio::test]
    async fn invoke_through_catalog() {
        let catalog = ToolCatalog::new();
        catalog.register(Arc::new(EchoTool::new("mail", &["send"])));

        let tool = catalog.implementation("mail").unwrap();
        let ctx = ToolCtx {
            tenant_id: "t1".into(),
            public_config: serde_json::Map::new(),
            credential: crate::vault::CredentialMap::new(),
        };
        let res = tool.invoke("send", &ctx, &serde_json::json!({})).await;
        assert!(!res.is_error);
        assert!(res.content.starts_with("mail:send:"));
    }
}
