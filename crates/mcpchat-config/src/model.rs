use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Validated configuration for one run of the chat client.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub llm: LlmConfig,
    pub example_queries: Option<Vec<String>>,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    pub schema_transformations: Option<bool>,
}

impl Config {
    /// Tool schemas are adapted to the provider unless explicitly disabled.
    pub fn schema_transformations_enabled(&self) -> bool {
        self.schema_transformations.unwrap_or(true)
    }

    /// Names of the servers that are launched as local subprocesses.
    pub fn command_server_names(&self) -> Vec<String> {
        self.mcp_servers
            .iter()
            .filter(|(_, server)| server.is_command())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub model_provider: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<serde_json::Number>,
    pub max_completion_tokens: Option<serde_json::Number>,
}

impl LlmConfig {
    pub fn max_tokens_u32(&self) -> Option<u32> {
        self.max_tokens.as_ref().and_then(number_to_u32)
    }

    pub fn max_completion_tokens_u32(&self) -> Option<u32> {
        self.max_completion_tokens.as_ref().and_then(number_to_u32)
    }
}

fn number_to_u32(n: &serde_json::Number) -> Option<u32> {
    if let Some(v) = n.as_u64() {
        return u32::try_from(v).ok();
    }
    let f = n.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        Some(f as u32)
    } else {
        None
    }
}

/// One entry of `mcp_servers`.
#[derive(Debug, Clone, PartialEq)]
pub enum McpServerConfig {
    Command(CommandServerConfig),
    Url(UrlServerConfig),
}

impl McpServerConfig {
    pub fn is_command(&self) -> bool {
        matches!(self, McpServerConfig::Command(_))
    }

    pub fn as_command_mut(&mut self) -> Option<&mut CommandServerConfig> {
        match self {
            McpServerConfig::Command(cmd) => Some(cmd),
            McpServerConfig::Url(_) => None,
        }
    }

    /// Explicit transport from `transport`, falling back to `type`.
    pub fn transport(&self) -> Option<&str> {
        let (transport, server_type) = match self {
            McpServerConfig::Command(c) => (&c.transport, &c.server_type),
            McpServerConfig::Url(u) => (&u.transport, &u.server_type),
        };
        transport.as_deref().or(server_type.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandServerConfig {
    pub command: String,
    pub args: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub transport: Option<String>,
    pub server_type: Option<String>,
    /// Filled in at startup, never read from the file.
    pub stderr: Option<StderrHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrlServerConfig {
    pub url: String,
    pub transport: Option<String>,
    pub server_type: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
}

/// Write handle to a server's log file, used as the child's stderr.
///
/// Clones share one descriptor; [`StderrHandle::close`] closes it for all of
/// them.
#[derive(Debug, Clone)]
pub struct StderrHandle(Arc<Mutex<Option<File>>>);

impl StderrHandle {
    pub fn new(file: File) -> Self {
        Self(Arc::new(Mutex::new(Some(file))))
    }

    fn slot(&self) -> io::Result<MutexGuard<'_, Option<File>>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log handle lock poisoned"))
    }

    /// Duplicate the underlying descriptor so it can be handed to a child process.
    pub fn try_clone_file(&self) -> io::Result<File> {
        match self.slot()?.as_ref() {
            Some(file) => file.try_clone(),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "log handle already closed",
            )),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.slot().map(|slot| slot.is_none()).unwrap_or(true)
    }

    /// Flush and close the descriptor. Closing an already closed handle is a no-op.
    pub fn close(&self) -> io::Result<()> {
        match self.slot()?.take() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }
}

impl PartialEq for StderrHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
