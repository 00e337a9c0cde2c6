mod app;
mod conversation;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use mcpchat_config::ConfigLoadError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mcpchat",
    version,
    about = "Chat with an LLM agent that calls tools on MCP servers"
)]
pub struct Cli {
    /// Path to the JSON5 configuration file
    #[arg(short, long, default_value = "llm_mcp_config.json5")]
    pub config: PathBuf,

    /// Print debug logs
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory for MCP server log files
    #[arg(short, long = "log-dir", visible_alias = "logDir", default_value = ".")]
    pub log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match app::run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err, &cli.config),
    }
}

/// Print a startup or conversation failure. Configuration and model errors
/// come with hints and end the program normally; anything else exits with 1.
fn report_error(err: &anyhow::Error, config_path: &Path) -> ExitCode {
    eprintln!("{err}");
    match hints_for(err, config_path) {
        Some(hints) => {
            for hint in hints {
                eprintln!("{hint}");
            }
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}

fn hints_for(err: &anyhow::Error, config_path: &Path) -> Option<Vec<String>> {
    if let Some(load_err) = err.downcast_ref::<ConfigLoadError>() {
        let mut hints = Vec::new();
        if load_err.is_not_found() {
            hints.push(format!(
                "Make sure the config file \"{}\" is available",
                config_path.display()
            ));
            hints.push(
                "Use the --config option to specify which JSON5 configuration file to read"
                    .to_string(),
            );
        }
        return Some(hints);
    }

    match err.downcast_ref::<mcpchat_common::Error>() {
        Some(e) if e.is_model_init() => {
            Some(vec!["Check the .env file for the API key settings".to_string()])
        }
        _ => None,
    }
}
