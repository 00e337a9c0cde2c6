use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::Config;
use crate::substitution::{process_env, substitute_env};
use crate::validation::{ValidationError, validate_config};

/// A configuration file could not be turned into a [`Config`].
#[derive(Error, Debug)]
#[error("Failed to load configuration from \"{}\": {kind}", .path.display())]
pub struct ConfigLoadError {
    pub path: PathBuf,
    #[source]
    pub kind: ConfigLoadErrorKind,
}

#[derive(Error, Debug)]
pub enum ConfigLoadErrorKind {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] json5::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ConfigLoadError {
    /// The file did not exist, as opposed to existing but being invalid.
    pub fn is_not_found(&self) -> bool {
        matches!(&self.kind, ConfigLoadErrorKind::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.kind {
            ConfigLoadErrorKind::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigLoadError> for mcpchat_common::Error {
    fn from(e: ConfigLoadError) -> Self {
        mcpchat_common::Error::Config(e.to_string())
    }
}

/// Reads JSON5 configuration files, expanding `${NAME}` references first.
pub struct ConfigLoader {
    env: BTreeMap<String, String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader that substitutes from a snapshot of the current process environment.
    pub fn new() -> Self {
        Self { env: process_env() }
    }

    pub fn with_env<K, V>(env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            env: env.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Config, ConfigLoadError> {
        let path = path.as_ref();
        info!("loading config from {}", path.display());

        self.load_inner(path).map_err(|kind| ConfigLoadError {
            path: path.to_path_buf(),
            kind,
        })
    }

    fn load_inner(&self, path: &Path) -> Result<Config, ConfigLoadErrorKind> {
        let raw = std::fs::read_to_string(path)?;
        self.parse_str(&raw)
    }

    /// Substitute, parse and validate configuration text.
    pub fn parse_str(&self, raw: &str) -> Result<Config, ConfigLoadErrorKind> {
        let text = substitute_env(raw, &self.env);
        let document: Value = json5::from_str(&text)?;
        let config = validate_config(&document)?;

        debug!(
            "config has {} MCP server(s), provider={}",
            config.mcp_servers.len(),
            config.llm.model_provider
        );
        Ok(config)
    }
}

/// Load `path` using the current process environment for substitution.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigLoadError> {
    ConfigLoader::new().load(path)
}
