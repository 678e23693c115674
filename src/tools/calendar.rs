//! Calendar tool: list_events, create_event against a Google-Calendar-shaped API.
//!
//! The target calendar comes from public config (`calendar_id`, default
//! `primary`) — a typical per-tenant setting an administrator configures.

use serde_json::{Value, json};

use crate::tools::catalog::{AuthSpec, BoxFuture, FunctionDecl, OAuth2Spec, Tool, ToolDescriptor};
use crate::tools::invocation::{
    ToolCtx, ToolResult, get_optional_string, get_optional_u64, get_string, read_api_response,
};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_CALENDAR_ID: &str = "primary";
const DEFAULT_MAX_RESULTS: u64 = 10;

pub struct CalendarTool {
    client: reqwest::Client,
}

impl CalendarTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn list_events(&self, ctx: &ToolCtx, args: &Value) -> ToolResult {
        let token = match ctx.access_token() {
            Some(t) => t,
            None => return ToolResult::error("calendar is not authenticated"),
        };
        let max_results = get_optional_u64(args, "max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 50);

        let mut query: Vec<(&str, String)> = vec![
            ("singleEvents", "true".into()),
            ("orderBy", "startTime".into()),
            ("maxResults", max_results.to_string()),
        ];
        if let Some(time_min) = get_optional_string(args, "time_min") {
            query.push(("timeMin", time_min));
        }
        if let Some(time_max) = get_optional_string(args, "time_max") {
            query.push(("timeMax", time_max));
        }

        let url = format!("{}/calendars/{}/events", api_base(ctx), calendar_id(ctx));
        let res = self.client.get(&url).query(&query).bearer_auth(token).send().await;
        match res {
            Ok(res) => read_api_response(res).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    async fn create_event(&self, ctx: &ToolCtx, args: &Value) -> ToolResult {
        let token = match ctx.access_token() {
            Some(t) => t,
            None => return ToolResult::error("calendar is not authenticated"),
        };
        let summary = match get_string(args, "summary") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };
        let start = match get_string(args, "start") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };
        let end = match get_string(args, "end") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };

        let mut event = json!({
            "summary": summary,
            "start": { "dateTime": start },
            "end": { "dateTime": end }
        });
        if let Some(description) = get_optional_string(args, "description") {
            event["description"] = json!(description);
        }

        let url = format!("{}/calendars/{}/events", api_base(ctx), calendar_id(ctx));
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&event)
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

fn calendar_id(ctx: &ToolCtx) -> String {
    ctx.config_str("calendar_id")
        .unwrap_or(DEFAULT_CALENDAR_ID)
        .to_string()
}

impl Tool for CalendarTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "calendar".to_string(),
            description: "Read and create events on the tenant's calendar.".to_string(),
            functions: vec![
                FunctionDecl::new(
                    "list_events",
                    "List upcoming events on the configured calendar.",
                    json!({
                        "type": "object",
                        "properties": {
                            "time_min": { "type": "string", "description": "RFC 3339 lower bound" },
                            "time_max": { "type": "string", "description": "RFC 3339 upper bound" },
                            "max_results": { "type": "integer", "minimum": 1, "maximum": 50 }
                        }
                    }),
                ),
                FunctionDecl::new(
                    "create_event",
                    "Create an event on the configured calendar.",
                    json!({
                        "type": "object",
                        "properties": {
                            "summary": { "type": "string" },
                            "start": { "type": "string", "description": "RFC 3339 start time" },
                            "end": { "type": "string", "description": "RFC 3339 end time" },
                            "description": { "type": "string" }
                        },
                        "required": ["summary", "start", "end"]
                    }),
                ),
            ],
            auth: AuthSpec::OAuth2(OAuth2Spec {
                provider: "google".to_string(),
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
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
                "list_events" => self.list_events(ctx, args).await,
                "create_event" => self.create_event(ctx, args).await,
                other => ToolResult::error(format!("calendar: unknown function '{other}'")),
            }
        })
    }
}
