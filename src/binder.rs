//! Bind a call snapshot to callable functions for the conversational engine.
//!
//! The engine receives plain values: a function definition it can forward to
//! the model, and an `invoke` that already carries the tenant's config and
//! the snapshot's credential copy. It never learns about tenants, stores, or
//! vaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::session::CallSessionSnapshot;
use crate::tools::catalog::{Tool, ToolCatalog};
use crate::tools::invocation::{ToolCtx, ToolResult};
use crate::vault::CredentialMap;

/// OpenAI-style function tool definition, the wire shape conversational
/// engines consume: `type: "function"`, `function: { name, description, parameters }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: FunctionDefInner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefInner {
    pub name: String,
    pub description: String,
    /// JSON schema object, e.g. `{"type":"object","properties":{...}}`.
    pub parameters: Value,
}

/// One callable exposed to the engine for the duration of a call. Holds the
/// implementation reference plus the captured config/credential pair — an
/// explicit value, not a generated closure.
pub struct BoundFunction {
    pub tool_name: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
    tool: Arc<dyn Tool>,
    tenant_id: String,
    public_config: serde_json::Map<String, Value>,
    credential: CredentialMap,
}

impl std::fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundFunction")
            .field("tool_name", &self.tool_name)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BoundFunction {
    /// Invoke with engine-extracted arguments; the snapshot's config and
    /// credential copy are supplied underneath.
    pub async fn invoke(&self, args: &Value) -> ToolResult {
        let ctx = ToolCtx {
            tenant_id: self.tenant_id.clone(),
            public_config: self.public_config.clone(),
            credential: self.credential.clone(),
        };
        self.tool.invoke(&self.name, &ctx, args).await
    }

    /// Engine-facing function definition.
    pub fn to_def(&self) -> FunctionDef {
        FunctionDef {
            type_: "function".to_string(),
            function: FunctionDefInner {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }
}

/// Produce the callable list for one call: intersect the snapshot with the
/// catalog, drop opted-out functions. Degrades by omission — a missing
/// descriptor or a stale opt-out name is logged and skipped, never raised.
pub fn bind(snapshot: &CallSessionSnapshot, catalog: &ToolCatalog) -> Vec<BoundFunction> {
    let mut bound = Vec::new();
    for entry in &snapshot.tools {
        let authorization = &entry.authorization;
        let Some(descriptor) = catalog.lookup(&authorization.tool_name) else {
            warn!(
                "session {}: tool '{}' authorized but not deployed; skipping its functions",
                snapshot.session_id, authorization.tool_name
            );
            continue;
        };
        let Some(tool) = catalog.implementation(&authorization.tool_name) else {
            warn!(
                "session {}: tool '{}' has no implementation; skipping its functions",
                snapshot.session_id, authorization.tool_name
            );
            continue;
        };

        for stale in authorization
            .unselected_functions
            .iter()
            .filter(|name| !descriptor.declares_function(name))
        {
            // Leftover opt-out from a prior tool version.
            warn!(
                "session {}: tool '{}' opt-out '{}' matches no declared function; ignoring",
                snapshot.session_id, authorization.tool_name, stale
            );
        }

        for function in &descriptor.functions {
            if authorization.unselected_functions.contains(&function.name) {
                continue;
            }
            bound.push(BoundFunction {
                tool_name: authorization.tool_name.clone(),
                name: function.name.clone(),
                description: function.description.clone(),
                parameters: function.parameters.clone(),
                tool: Arc::clone(&tool),
                tenant_id: snapshot.tenant_id.clone(),
                public_config: authorization.public_config.clone(),
                credential: entry.credential.clone(),
            });
        }
    }
    bound
}
