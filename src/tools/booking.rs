//! Booking tool: scheduling links against a Calendly-shaped API. API-key auth.

use serde_json::{Value, json};

use crate::tools::catalog::{AuthSpec, BoxFuture, FunctionDecl, Tool, ToolDescriptor};
use crate::tools::invocation::{ToolCtx, ToolResult, get_string, read_api_response};
use crate::vault::API_KEY;

const DEFAULT_API_BASE: &str = "https://api.calendly.com";

pub struct BookingTool {
    client: reqwest::Client,
}

impl BookingTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn list_event_types(&self, ctx: &ToolCtx) -> ToolResult {
        let key = match ctx.api_key() {
            Some(k) => k,
            None => return ToolResult::error("booking is not authenticated"),
        };
        let url = format!("{}/event_types", api_base(ctx));
        let res = self.client.get(&url).bearer_auth(key).send().await;
        match res {
            Ok(res) => read_api_response(res).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    async fn create_invite(&self, ctx: &ToolCtx, args: &Value) -> ToolResult {
        let key = match ctx.api_key() {
            Some(k) => k,
            None => return ToolResult::error("booking is not authenticated"),
        };
        let event_type = match get_string(args, "event_type") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };
        let invitee_email = match get_string(args, "invitee_email") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };

        let url = format!("{}/scheduling_links", api_base(ctx));
        let res = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&json!({
                "owner": event_type,
                "max_event_count": 1,
                "invitee_email": invitee_email
            }))
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

impl Tool for BookingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "booking".to_string(),
            description: "Offer the tenant's scheduling links to callers.".to_string(),
            functions: vec![
                FunctionDecl::new(
                    "list_event_types",
                    "List the tenant's bookable event types.",
                    json!({ "type": "object", "properties": {} }),
                ),
                FunctionDecl::new(
                    "create_invite",
                    "Create a single-use scheduling link for a caller.",
                    json!({
                        "type": "object",
                        "properties": {
                            "event_type": { "type": "string", "description": "Event type URI" },
                            "invitee_email": { "type": "string" }
                        },
                        "required": ["event_type", "invitee_email"]
                    }),
                ),
            ],
            auth: AuthSpec::ApiKey {
                credential_key: API_KEY.to_string(),
            },
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
                "list_event_types" => self.list_event_types(ctx).await,
                "create_invite" => self.create_invite(ctx, args).await,
                other => ToolResult::error(format!("booking: unknown function '{other}'")),
            }
        })
    }
}
