//! Invocation context and result passed between bound functions and tool implementations.

use serde_json::Value;

use crate::vault::{ACCESS_TOKEN, API_KEY, CredentialMap};

/// Context for one function invocation: the tenant's public config and the
/// call snapshot's decrypted credential copy. Tool implementations never
/// touch the store or the vault directly.
#[derive(Debug, Clone)]
pub struct ToolCtx {
    pub tenant_id: String,
    /// Non-secret per-tenant settings (e.g. a calendar id).
    pub public_config: serde_json::Map<String, Value>,
    /// Decrypted credential copy captured at call start.
    pub credential: CredentialMap,
}

impl ToolCtx {
    /// String value from public config.
    #[inline]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.public_config.get(key).and_then(Value::as_str)
    }

    /// OAuth2 bearer token from the credential copy.
    #[inline]
    pub fn access_token(&self) -> Option<&str> {
        self.credential.get(ACCESS_TOKEN).and_then(Value::as_str)
    }

    /// API key from the credential copy.
    #[inline]
    pub fn api_key(&self) -> Option<&str> {
        self.credential.get(API_KEY).and_then(Value::as_str)
    }
}

/// Result of a function invocation, handed back to the conversational engine.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Content for the engine to fold into the conversation.
    pub content: String,
    /// If true, the engine may retry or report the failure.
    pub is_error: bool,
}

impl ToolResult {
    #[inline]
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    #[inline]
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Required string argument from the engine-supplied args object.
pub fn get_string(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| format!("missing or invalid '{key}'"))
}

/// Optional string argument.
pub fn get_optional_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(String::from)
}

/// Optional integer argument.
pub fn get_optional_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

/// Turn an upstream API response into a ToolResult: 2xx passes the body
/// through, anything else becomes an error carrying status and body.
pub async fn read_api_response(res: reqwest::Response) -> ToolResult {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    if status.is_success() {
        ToolResult::ok(body)
    } else {
        ToolResult::error(format!("upstream error {}: {}", status, body.trim()))
    }
}
