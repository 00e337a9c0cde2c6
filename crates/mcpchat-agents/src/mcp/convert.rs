use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use mcpchat_common::Result;
use mcpchat_config::McpServerConfig;
use tracing::{info, warn};

use super::manager::McpManager;
use crate::schema::ProviderHint;
use crate::tools::Tool;

/// Options for [`convert_mcp_to_tools`].
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    pub provider_hint: ProviderHint,
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            provider_hint: ProviderHint::None,
            handshake_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Disconnects every server started by [`convert_mcp_to_tools`].
pub struct McpCleanup {
    manager: Arc<McpManager>,
    done: AtomicBool,
}

impl McpCleanup {
    /// Disconnect all servers. Calls after the first are no-ops.
    pub async fn cleanup(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.manager.disconnect_all().await;
        info!("MCP servers disconnected");
    }
}

/// Connect to every configured server concurrently and collect their tools.
///
/// If any server fails to connect, the servers that did connect are shut
/// down and the first error is returned.
pub async fn convert_mcp_to_tools(
    servers: &BTreeMap<String, McpServerConfig>,
    options: &ConvertOptions,
) -> Result<(Vec<Box<dyn Tool>>, McpCleanup)> {
    let manager = Arc::new(McpManager::new(options.handshake_timeout));

    info!(
        "initializing {} MCP server(s), schema hint: {}",
        servers.len(),
        options.provider_hint.as_str()
    );

    let results = join_all(
        servers
            .iter()
            .map(|(name, server)| manager.connect(name, server)),
    )
    .await;

    if let Some(err) = results.into_iter().find_map(|r| r.err()) {
        warn!("MCP initialization failed: {err}");
        manager.disconnect_all().await;
        return Err(err);
    }

    let mut tools: Vec<Box<dyn Tool>> = Vec::new();
    for name in servers.keys() {
        tools.extend(
            manager
                .take_tools(name, options.provider_hint, options.call_timeout)
                .await,
        );
    }

    info!(
        "MCP servers initialized: {} tool(s) available: {}",
        tools.len(),
        tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
    );

    Ok((
        tools,
        McpCleanup {
            manager,
            done: AtomicBool::new(false),
        },
    ))
}
