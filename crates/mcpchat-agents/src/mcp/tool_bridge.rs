use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcpchat_common::{Error, Result};
use rmcp::model::{CallToolRequestParams, CallToolResult, RawContent};
use rmcp::service::{Peer, RoleClient};
use serde_json::{Map, Value};
use tracing::debug;

use super::manager::McpToolInfo;
use crate::tools::{Tool, ToolOutput};

/// One tool of a connected MCP server, called under its server-side name.
pub struct McpTool {
    server: Arc<str>,
    name: String,
    description: String,
    schema: Value,
    peer: Arc<Peer<RoleClient>>,
    timeout: Duration,
}

impl McpTool {
    /// `info.input_schema` is expected to be already adapted to the model
    /// provider.
    pub(crate) fn new(
        server: Arc<str>,
        info: McpToolInfo,
        peer: Arc<Peer<RoleClient>>,
        timeout: Duration,
    ) -> Self {
        let description = info
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("{} (MCP server \"{server}\")", info.name));
        Self {
            server,
            name: info.name,
            description,
            schema: info.input_schema,
            peer,
            timeout,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        debug!("tools/call {} on \"{}\"", self.name, self.server);
        let mut params = CallToolRequestParams::new(self.name.clone());
        params.arguments = call_arguments(input);

        match tokio::time::timeout(self.timeout, self.peer.call_tool(params)).await {
            Ok(Ok(result)) => Ok(tool_output(result)),
            Ok(Err(e)) => Err(Error::Mcp(format!(
                "tool {} on \"{}\" failed: {e}",
                self.name, self.server
            ))),
            Err(_) => Err(Error::Mcp(format!(
                "tool {} on \"{}\" timed out after {}s",
                self.name,
                self.server,
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Models occasionally send `null` or a bare value for a tool without
/// parameters; MCP only accepts an argument object.
fn call_arguments(input: Value) -> Option<Map<String, Value>> {
    match input {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => Some(Map::from_iter([("input".to_string(), other)])),
    }
}

/// Text the model sees for a tool result; `is_error` from the server
/// decides whether the agent loop reports it as a failure.
fn tool_output(result: CallToolResult) -> ToolOutput {
    let text = result
        .content
        .iter()
        .map(|content| render(&content.raw))
        .collect::<Vec<_>>()
        .join("\n");

    let text = match (text.is_empty(), result.structured_content) {
        (true, Some(structured)) => structured.to_string(),
        _ => text,
    };

    if result.is_error.unwrap_or(false) {
        ToolOutput::error(text)
    } else {
        ToolOutput::success(text)
    }
}

fn render(content: &RawContent) -> Cow<'_, str> {
    match content {
        RawContent::Text(text) => Cow::Borrowed(text.text.as_str()),
        RawContent::Image(image) => Cow::Owned(format!("[image: {}]", image.mime_type)),
        _ => Cow::Borrowed("[non-text content]"),
    }
}
