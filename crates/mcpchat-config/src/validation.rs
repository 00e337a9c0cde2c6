use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{CommandServerConfig, Config, LlmConfig, McpServerConfig, UrlServerConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Configuration must be an object")]
    NotAnObject,

    #[error("LLM configuration is required")]
    MissingLlm,

    #[error("LLM configuration must be an object")]
    LlmNotAnObject,

    #[error("LLM model_provider must be a string")]
    LlmProvider,

    #[error("LLM model must be a string")]
    LlmModel,

    #[error("LLM {0} must be a number if provided")]
    LlmNumber(&'static str),

    #[error("example_queries must be an array if provided")]
    ExampleQueriesNotArray,

    #[error("All example queries must be strings")]
    ExampleQueryNotString,

    #[error("mcp_servers configuration is required")]
    MissingMcpServers,

    #[error("mcp_servers must be an object")]
    McpServersNotObject,

    #[error("schema_transformations must be a boolean if provided")]
    SchemaTransformations,

    #[error("Invalid configuration for MCP server \"{name}\": {source}")]
    Server {
        name: String,
        #[source]
        source: ServerConfigError,
    },
}

/// Why a single `mcp_servers` entry was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerConfigError {
    #[error("MCP server configuration must be an object")]
    NotAnObject,

    #[error("MCP server configuration must include command or url")]
    MissingCommandOrUrl,

    #[error("MCP server configuration must not include both command and url")]
    BothCommandAndUrl,

    #[error("MCP server {0} must be a string")]
    NotAString(&'static str),

    #[error("MCP server args must be an array")]
    ArgsNotArray,

    #[error("All MCP server args must be strings")]
    ArgNotString,

    #[error("MCP server headers must be an object if provided")]
    HeadersNotObject,

    #[error("All MCP server headers values must be strings")]
    HeaderValueNotString,

    #[error("MCP server env must be an object if provided")]
    EnvNotObject,

    #[error("All MCP server env values must be strings")]
    EnvValueNotString,

    #[error("MCP server stderr is assigned at startup and cannot be configured")]
    StderrNotConfigurable,

    #[error("MCP server field \"{field}\" is not allowed for {variant}-based servers")]
    FieldNotAllowed {
        field: &'static str,
        variant: &'static str,
    },
}

const LLM_NUMBER_FIELDS: [&str; 3] = ["temperature", "max_tokens", "max_completion_tokens"];
const URL_ONLY_FIELDS: [&str; 1] = ["headers"];
const COMMAND_ONLY_FIELDS: [&str; 3] = ["args", "env", "stderr"];

/// Narrow an untyped document into a [`Config`].
///
/// Returns the first violation found. Values are kind-checked, never coerced.
pub fn validate_config(value: &Value) -> Result<Config, ValidationError> {
    let root = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let llm = validate_llm(root.get("llm").ok_or(ValidationError::MissingLlm)?)?;

    let example_queries = match root.get("example_queries") {
        None => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|q| {
                    q.as_str()
                        .map(str::to_string)
                        .ok_or(ValidationError::ExampleQueryNotString)
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => return Err(ValidationError::ExampleQueriesNotArray),
    };

    let servers = root
        .get("mcp_servers")
        .ok_or(ValidationError::MissingMcpServers)?
        .as_object()
        .ok_or(ValidationError::McpServersNotObject)?;

    let mut mcp_servers = BTreeMap::new();
    for (name, entry) in servers {
        let server = validate_server(entry).map_err(|source| ValidationError::Server {
            name: name.clone(),
            source,
        })?;
        mcp_servers.insert(name.clone(), server);
    }

    let schema_transformations = match root.get("schema_transformations") {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return Err(ValidationError::SchemaTransformations),
    };

    Ok(Config {
        llm,
        example_queries,
        mcp_servers,
        schema_transformations,
    })
}

fn validate_llm(value: &Value) -> Result<LlmConfig, ValidationError> {
    let llm = value.as_object().ok_or(ValidationError::LlmNotAnObject)?;

    let model_provider = required_str(llm, "model_provider").ok_or(ValidationError::LlmProvider)?;
    let model = required_str(llm, "model").ok_or(ValidationError::LlmModel)?;

    for field in LLM_NUMBER_FIELDS {
        if let Some(v) = llm.get(field) {
            if !v.is_number() {
                return Err(ValidationError::LlmNumber(field));
            }
        }
    }

    Ok(LlmConfig {
        model_provider,
        model,
        temperature: llm.get("temperature").and_then(Value::as_f64),
        max_tokens: number(llm, "max_tokens"),
        max_completion_tokens: number(llm, "max_completion_tokens"),
    })
}

fn validate_server(value: &Value) -> Result<McpServerConfig, ServerConfigError> {
    let entry = value.as_object().ok_or(ServerConfigError::NotAnObject)?;

    let has_url = entry.contains_key("url");
    let has_command = entry.contains_key("command");
    match (has_command, has_url) {
        (false, false) => return Err(ServerConfigError::MissingCommandOrUrl),
        (true, true) => return Err(ServerConfigError::BothCommandAndUrl),
        _ => {}
    }

    // The discriminator's own type is reported before any other field.
    let discriminator = if has_url { "url" } else { "command" };
    let target = optional_str(entry, discriminator)?
        .ok_or(ServerConfigError::NotAString(discriminator))?;

    let transport = optional_str(entry, "transport")?;
    let server_type = optional_str(entry, "type")?;

    if has_url {
        url_server(entry, target, transport, server_type)
    } else {
        command_server(entry, target, transport, server_type)
    }
}

fn url_server(
    entry: &Map<String, Value>,
    url: String,
    transport: Option<String>,
    server_type: Option<String>,
) -> Result<McpServerConfig, ServerConfigError> {
    reject_fields(entry, &COMMAND_ONLY_FIELDS, "url")?;

    let headers = string_map(
        entry,
        "headers",
        ServerConfigError::HeadersNotObject,
        ServerConfigError::HeaderValueNotString,
    )?;

    Ok(McpServerConfig::Url(UrlServerConfig {
        url,
        transport,
        server_type,
        headers,
    }))
}

fn command_server(
    entry: &Map<String, Value>,
    command: String,
    transport: Option<String>,
    server_type: Option<String>,
) -> Result<McpServerConfig, ServerConfigError> {
    reject_fields(entry, &URL_ONLY_FIELDS, "command")?;
    if entry.contains_key("stderr") {
        return Err(ServerConfigError::StderrNotConfigurable);
    }

    let args = match entry.get("args") {
        None => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|a| {
                    a.as_str()
                        .map(str::to_string)
                        .ok_or(ServerConfigError::ArgNotString)
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => return Err(ServerConfigError::ArgsNotArray),
    };

    let env = string_map(
        entry,
        "env",
        ServerConfigError::EnvNotObject,
        ServerConfigError::EnvValueNotString,
    )?;

    Ok(McpServerConfig::Command(CommandServerConfig {
        command,
        args,
        env,
        transport,
        server_type,
        stderr: None,
    }))
}

fn required_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn number(map: &Map<String, Value>, key: &str) -> Option<serde_json::Number> {
    match map.get(key) {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    }
}

fn optional_str(
    map: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, ServerConfigError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ServerConfigError::NotAString(key)),
    }
}

fn reject_fields(
    map: &Map<String, Value>,
    fields: &[&'static str],
    variant: &'static str,
) -> Result<(), ServerConfigError> {
    match fields.iter().find(|f| map.contains_key(**f)) {
        Some(field) => Err(ServerConfigError::FieldNotAllowed {
            field: *field,
            variant,
        }),
        None => Ok(()),
    }
}

fn string_map(
    map: &Map<String, Value>,
    key: &str,
    not_object: ServerConfigError,
    bad_value: ServerConfigError,
) -> Result<Option<BTreeMap<String, String>>, ServerConfigError> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    let object = value.as_object().ok_or(not_object)?;

    let mut out = BTreeMap::new();
    for (k, v) in object {
        let s = v.as_str().ok_or_else(|| bad_value.clone())?;
        out.insert(k.clone(), s.to_string());
    }
    Ok(Some(out))
}

impl From<ValidationError> for mcpchat_common::Error {
    fn from(e: ValidationError) -> Self {
        mcpchat_common::Error::Config(e.to_string())
    }
}

impl From<ServerConfigError> for mcpchat_common::Error {
    fn from(e: ServerConfigError) -> Self {
        mcpchat_common::Error::Config(e.to_string())
    }
}
