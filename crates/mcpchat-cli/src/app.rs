use std::sync::Arc;

use anyhow::Result;
use mcpchat_agents::{
    ConvertOptions, LlmProvider, MemorySaver, ModelSettings, ProviderHint, ReactAgent,
    ServerLogManager, convert_mcp_to_tools, init_chat_model,
};
use mcpchat_config::{Config, ConfigLoader, McpServerConfig};
use tracing::info;

use crate::Cli;
use crate::conversation;

/// Load the configuration, start the model and MCP servers, and run the
/// conversation. Cleanup runs on every exit path once the log manager exists.
pub async fn run(cli: &Cli) -> Result<()> {
    let mut config = ConfigLoader::new().load(&cli.config)?;
    info!("loaded configuration from {}", cli.config.display());

    println!("Initializing model... {:?}\n", config.llm);
    let model = init_chat_model(&ModelSettings::from(&config.llm))?;

    println!(
        "Initializing {} MCP server(s)...\n",
        config.mcp_servers.len()
    );

    let mut logs = ServerLogManager::new(&cli.log_dir);
    let result = run_with_logs(&mut config, model, &mut logs).await;
    logs.dispose_all();
    result
}

async fn run_with_logs(
    config: &mut Config,
    model: Arc<dyn LlmProvider>,
    logs: &mut ServerLogManager,
) -> Result<()> {
    for name in config.command_server_names() {
        let handle = logs.register(&name)?;
        if let Some(server) = config
            .mcp_servers
            .get_mut(&name)
            .and_then(McpServerConfig::as_command_mut)
        {
            server.stderr = Some(handle);
        }
    }

    let options = ConvertOptions {
        provider_hint: ProviderHint::for_provider(
            &config.llm.model_provider.to_lowercase(),
            config.schema_transformations_enabled(),
        ),
        ..Default::default()
    };
    let (tools, mcp_cleanup) = convert_mcp_to_tools(&config.mcp_servers, &options).await?;

    let agent = ReactAgent::new(model, tools, Arc::new(MemorySaver::new()));
    let example_queries = config.example_queries.clone().unwrap_or_default();

    let result = conversation::run(&agent, example_queries).await;
    mcp_cleanup.cleanup().await;
    result
}
