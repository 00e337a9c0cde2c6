pub mod anthropic;
pub mod chat_model;
pub mod checkpoint;
mod http;
pub mod logs;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod openai;
pub mod providers;
pub mod runtime;
pub mod schema;
pub mod tools;

pub use chat_model::{ModelSettings, init_chat_model};
pub use checkpoint::{CheckpointSaver, MemorySaver, ThreadConfig};
pub use logs::ServerLogManager;
#[cfg(feature = "mcp")]
pub use mcp::{ConvertOptions, McpCleanup, convert_mcp_to_tools};
pub use providers::{ChatMessage, LlmProvider, LlmRequest, LlmResponse};
pub use runtime::{AgentState, ReactAgent};
pub use schema::{ProviderHint, transform_schema};
pub use tools::{Tool, ToolOutput};
