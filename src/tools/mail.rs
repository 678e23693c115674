//! Mail tool: send_message, search_messages against a Gmail-shaped API.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};

use crate::tools::catalog::{AuthSpec, BoxFuture, FunctionDecl, OAuth2Spec, Tool, ToolDescriptor};
use crate::tools::invocation::{
    ToolCtx, ToolResult, get_optional_u64, get_string, read_api_response,
};

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const DEFAULT_MAX_RESULTS: u64 = 10;

pub struct MailTool {
    client: reqwest::Client,
}

impl MailTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send_message(&self, ctx: &ToolCtx, args: &Value) -> ToolResult {
        let token = match ctx.access_token() {
            Some(t) => t,
            None => return ToolResult::error("mail is not authenticated"),
        };
        let to = match get_string(args, "to") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };
        let subject = match get_string(args, "subject") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };
        let body = match get_string(args, "body") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };

        let rfc822 = format!("To: {to}\r\nSubject: {subject}\r\n\r\n{body}");
        let url = format!("{}/users/me/messages/send", api_base(ctx));
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "raw": URL_SAFE_NO_PAD.encode(rfc822) }))
            .send()
            .await;
        match res {
            Ok(res) => read_api_response(res).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    async fn search_messages(&self, ctx: &ToolCtx, args: &Value) -> ToolResult {
        let token = match ctx.access_token() {
            Some(t) => t,
            None => return ToolResult::error("mail is not authenticated"),
        };
        let query = match get_string(args, "query") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };
        let max_results = get_optional_u64(args, "max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 50);

        let url = format!("{}/users/me/messages", api_base(ctx));
        let res = self
            .client
            .get(&url)
            .query(&[("q", query.as_str()), ("maxResults", &max_results.to_string())])
            .bearer_auth(token)
            .send()
            .await;
        match res {
            Ok(res) => read_api_response(res).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

fn api_base(ctx: &ToolCtx) -> String {
    ctx.config_str("api_base")
        .unwrap_or(DEFAULT_API_BASE)
        .trim_end_matches('/')
        .to_string()
}

impl Tool for MailTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "mail".to_string(),
            description: "Send and search the tenant's email.".to_string(),
            functions: vec![
                FunctionDecl::new(
                    "send_message",
                    "Send an email on behalf of the tenant.",
                    json!({
                        "type": "object",
                        "properties": {
                            "to": { "type": "string", "description": "Recipient address" },
                            "subject": { "type": "string" },
                            "body": { "type": "string", "description": "Plain-text body" }
                        },
                        "required": ["to", "subject", "body"]
                    }),
                ),
                FunctionDecl::new(
                    "search_messages",
                    "Search the tenant's mailbox.",
                    json!({
                        "type": "object",
                        "properties": {
                            "query": { "type": "string", "description": "Mailbox search query" },
                            "max_results": { "type": "integer", "minimum": 1, "maximum": 50 }
                        },
                        "required": ["query"]
                    }),
                ),
            ],
            auth: AuthSpec::OAuth2(OAuth2Spec {
                provider: "google".to_string(),
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                scopes: vec![
                    "https://www.googleapis.com/auth/gmail.send".to_string(),
                    "https://www.googleapis.com/auth/gmail.readonly".to_string(),
                ],
            }),
        }
    }

    fn invoke<'a>(
        &'a self,
        function: &'a str,
        ctx: &'a ToolCtx,
        args: &'a Value,
    ) -> BoxFuture<'a, ToolResult> {
        Box::pin(async move {
            match function {
                "send_message" => self.send_message(ctx, args).await,
                "search_messages" => self.search_messages(ctx, args).await,
                other => ToolResult::error(format!("mail: unknown function '{other}'")),
            }
        })
    }
}
