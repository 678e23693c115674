//! Spreadsheet tool: append_row, read_range against a Sheets-shaped API.
//!
//! Requires `spreadsheet_id` in public config — there is no sensible default.

use serde_json::{Value, json};

use crate::tools::catalog::{AuthSpec, BoxFuture, FunctionDecl, OAuth2Spec, Tool, ToolDescriptor};
use crate::tools::invocation::{ToolCtx, ToolResult, get_string, read_api_response};

const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4";
const APPEND_RANGE: &str = "A1";

pub struct SheetsTool {
    client: reqwest::Client,
}

impl SheetsTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn append_row(&self, ctx: &ToolCtx, args: &Value) -> ToolResult {
        let (token, spreadsheet_id) = match required(ctx) {
            Ok(pair) => pair,
            Err(e) => return ToolResult::error(e),
        };
        let values = match args.get("values").and_then(Value::as_array) {
            Some(v) if !v.is_empty() => v.clone(),
            _ => return ToolResult::error("missing or invalid 'values'"),
        };

        let url = format!(
            "{}/spreadsheets/{}/values/{}:append",
            api_base(ctx),
            spreadsheet_id,
            APPEND_RANGE
        );
        let res = self
            .client
            .post(&url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(token)
            .json(&json!({ "values": [values] }))
            .send()
            .await;
        match res {
            Ok(res) => read_api_response(res).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    async fn read_range(&self, ctx: &ToolCtx, args: &Value) -> ToolResult {
        let (token, spreadsheet_id) = match required(ctx) {
            Ok(pair) => pair,
            Err(e) => return ToolResult::error(e),
        };
        let range = match get_string(args, "range") {
            Ok(v) => v,
            Err(e) => return ToolResult::error(e),
        };

        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            api_base(ctx),
            spreadsheet_id,
            range
        );
        let res = self.client.get(&url).bearer_auth(token).send().await;
        match res {
            Ok(res) => read_api_response(res).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

fn required(ctx: &ToolCtx) -> Result<(String, String), String> {
    let token = ctx
        .access_token()
        .ok_or("spreadsheet is not authenticated")?
        .to_string();
    let spreadsheet_id = ctx
        .config_str("spreadsheet_id")
        .ok_or("spreadsheet_id is not configured")?
        .to_string();
    Ok((token, spreadsheet_id))
}

fn api_base(ctx: &ToolCtx) -> String {
    ctx.config_str("api_base")
        .unwrap_or(DEFAULT_API_BASE)
        .trim_end_matches('/')
        .to_string()
}

impl Tool for SheetsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "spreadsheet".to_string(),
            description: "Append to and read from the tenant's spreadsheet.".to_string(),
            functions: vec![
                FunctionDecl::new(
                    "append_row",
                    "Append one row to the configured spreadsheet.",
                    json!({
                        "type": "object",
                        "properties": {
                            "values": {
                                "type": "array",
                                "items": { "type": "string" },
                                "description": "Cell values, left to right"
                            }
                        },
                        "required": ["values"]
                    }),
                ),
                FunctionDecl::new(
                    "read_range",
                    "Read a range (A1 notation) from the configured spreadsheet.",
                    json!({
                        "type": "object",
                        "properties": {
                            "range": { "type": "string", "description": "A1-notation range" }
                        },
                        "required": ["range"]
                    }),
                ),
            ],
            auth: AuthSpec::OAuth2(OAuth2Spec {
                provider: "google".to_string(),
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                scopes: vec!["https://www.googleapis.com/auth/spreadsheets".to_string()],
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
                "append_row" => self.append_row(ctx, args).await,
                "read_range" => self.read_range(ctx, args).await,
                other => ToolResult::error(format!("spreadsheet: unknown function '{other}'")),
            }
        })
    }
}
