//! Tool catalog and builtin integrations: mail, calendar, spreadsheet, booking.

pub mod booking;
pub mod calendar;
pub mod catalog;
pub mod invocation;
pub mod mail;
pub mod sheets;

pub use catalog::{AuthSpec, FunctionDecl, OAuth2Spec, Tool, ToolCatalog, ToolDescriptor};
pub use invocation::{ToolCtx, ToolResult};

use std::sync::Arc;
use std::time::Duration;

const API_TIMEOUT_SECS: u64 = 15;
const USER_AGENT: &str = concat!("voxgate/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for tool REST calls.
pub fn api_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(API_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| e.to_string())
}

/// Build the catalog of available tool implementations. Called once at
/// process start; safe to call again on redeploy (registration is
/// idempotent by name).
pub fn build_catalog() -> ToolCatalog {
    let registry = ToolCatalog::new();
    if let Ok(client) = api_client() {
        registry.register(Arc::new(mail::MailTool::new(client.clone())));
        registry.register(Arc::new(calendar::CalendarTool::new(client.clone())));
        registry.register(Arc::new(sheets::SheetsTool::new(client.clone())));
        registry.register(Arc::new(booking::BookingTool::new(client)));
    }
    registry
}
