pub mod convert;
pub mod manager;
pub mod tool_bridge;

pub use convert::{ConvertOptions, McpCleanup, convert_mcp_to_tools};
pub use manager::McpManager;
pub use tool_bridge::McpTool;
