use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use mcpchat_common::{Error, Result};
use mcpchat_config::{CommandServerConfig, McpServerConfig, UrlServerConfig};
use rmcp::ServiceExt;
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::tool_bridge::McpTool;
use crate::schema::{ProviderHint, transform_schema};
use crate::tools::Tool;

/// Transports a URL-based server may not use.
const REJECTED_TRANSPORTS: &[&str] = &["sse", "ws", "websocket"];

/// Cached info about a tool discovered from an MCP server.
#[derive(Debug, Clone)]
pub struct McpToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// A live connection to one MCP server.
struct McpConnection {
    service: RunningService<RoleClient, ()>,
    tools: Vec<McpToolInfo>,
}

/// Manages the lifecycle of MCP server connections.
pub struct McpManager {
    connections: Arc<RwLock<HashMap<String, McpConnection>>>,
    handshake_timeout: Duration,
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl McpManager {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            handshake_timeout,
        }
    }

    /// Connect to one configured server and discover its tools.
    pub async fn connect(&self, name: &str, server: &McpServerConfig) -> Result<()> {
        let service = match server {
            McpServerConfig::Command(cmd) => self.connect_command(name, cmd).await?,
            McpServerConfig::Url(url) => self.connect_url(name, server, url).await?,
        };

        let mcp_tools = match service.list_all_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = service.cancel().await;
                return Err(Error::Mcp(format!(
                    "failed to list tools from \"{name}\": {e}"
                )));
            }
        };

        let tools: Vec<McpToolInfo> = mcp_tools
            .into_iter()
            .map(|t| McpToolInfo {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: serde_json::to_value(&*t.input_schema).unwrap_or_default(),
            })
            .collect();

        info!(
            "MCP server \"{name}\" connected: {} tool(s) discovered",
            tools.len()
        );
        for tool in &tools {
            debug!("  -> {name}: {}", tool.name);
        }

        self.connections
            .write()
            .await
            .insert(name.to_string(), McpConnection { service, tools });
        Ok(())
    }

    async fn connect_command(
        &self,
        name: &str,
        server: &CommandServerConfig,
    ) -> Result<RunningService<RoleClient, ()>> {
        let mut cmd = Command::new(&server.command);
        cmd.args(server.args.iter().flatten());
        if let Some(env) = &server.env {
            cmd.envs(env);
        }

        let stderr = match &server.stderr {
            Some(handle) => Stdio::from(handle.try_clone_file().map_err(|e| {
                Error::Mcp(format!("failed to attach log file for \"{name}\": {e}"))
            })?),
            None => Stdio::inherit(),
        };

        info!(
            "spawning MCP server \"{name}\": {} {}",
            server.command,
            server.args.as_deref().unwrap_or_default().join(" ")
        );

        let (transport, _) = TokioChildProcess::builder(cmd)
            .stderr(stderr)
            .spawn()
            .map_err(|e| Error::Mcp(format!("failed to spawn MCP server \"{name}\": {e}")))?;

        self.handshake(name, ().serve(transport)).await
    }

    async fn connect_url(
        &self,
        name: &str,
        server: &McpServerConfig,
        url: &UrlServerConfig,
    ) -> Result<RunningService<RoleClient, ()>> {
        check_url_transport(name, server, url)?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in url.headers.iter().flatten() {
            let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::Mcp(format!("invalid header \"{key}\" for \"{name}\": {e}")))?;
            let header_value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| Error::Mcp(format!("invalid header \"{key}\" for \"{name}\": {e}")))?;
            headers.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Mcp(format!("failed to build HTTP client for \"{name}\": {e}")))?;

        info!("connecting to MCP server \"{name}\" at {}", url.url);
        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(url.url.as_str()),
        );

        self.handshake(name, ().serve(transport)).await
    }

    async fn handshake<F, E>(&self, name: &str, serve: F) -> Result<RunningService<RoleClient, ()>>
    where
        F: Future<Output = std::result::Result<RunningService<RoleClient, ()>, E>>,
        E: std::fmt::Display,
    {
        let timeout = self.handshake_timeout;
        tokio::time::timeout(timeout, serve)
            .await
            .map_err(|_| {
                Error::Mcp(format!(
                    "MCP server \"{name}\" handshake timed out after {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Mcp(format!("MCP server \"{name}\" handshake failed: {e}")))
    }

    /// Disconnect all MCP servers.
    pub async fn disconnect_all(&self) {
        let conns: HashMap<String, McpConnection> =
            std::mem::take(&mut *self.connections.write().await);
        for (name, conn) in conns {
            info!("disconnecting MCP server \"{name}\"");
            if let Err(e) = conn.service.cancel().await {
                warn!("error cancelling MCP server \"{name}\": {e}");
            }
        }
    }

    /// Create `Tool` trait objects for all tools from a specific server,
    /// with input schemas adapted to `hint`.
    pub async fn take_tools(
        &self,
        name: &str,
        hint: ProviderHint,
        call_timeout: Duration,
    ) -> Vec<Box<dyn Tool>> {
        let conns = self.connections.read().await;
        let Some(conn) = conns.get(name) else {
            return Vec::new();
        };

        let peer: Arc<Peer<RoleClient>> = Arc::new(conn.service.peer().clone());
        let server: Arc<str> = Arc::from(name);

        conn.tools
            .iter()
            .map(|t| {
                let info = McpToolInfo {
                    input_schema: transform_schema(&t.input_schema, hint),
                    ..t.clone()
                };
                Box::new(McpTool::new(
                    Arc::clone(&server),
                    info,
                    Arc::clone(&peer),
                    call_timeout,
                )) as Box<dyn Tool>
            })
            .collect()
    }

    /// Names of the connected servers.
    pub async fn server_names(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }
}

/// Only streamable HTTP is supported for URL-based servers.
pub(crate) fn check_url_transport(
    name: &str,
    server: &McpServerConfig,
    url: &UrlServerConfig,
) -> Result<()> {
    let lowered = url.url.to_ascii_lowercase();
    if lowered.starts_with("ws://") || lowered.starts_with("wss://") {
        return Err(Error::Mcp(format!(
            "MCP server \"{name}\": WebSocket URLs are not supported: {}",
            url.url
        )));
    }
    if let Some(transport) = server.transport() {
        let transport = transport.to_ascii_lowercase();
        if REJECTED_TRANSPORTS.contains(&transport.as_str()) {
            return Err(Error::Mcp(format!(
                "MCP server \"{name}\": unsupported transport \"{transport}\""
            )));
        }
    }
    Ok(())
}
