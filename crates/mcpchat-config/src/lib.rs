pub mod loader;
pub mod model;
pub mod substitution;
pub mod validation;

pub use loader::{ConfigLoadError, ConfigLoader, load_config};
pub use model::{
    CommandServerConfig, Config, LlmConfig, McpServerConfig, StderrHandle, UrlServerConfig,
};
pub use substitution::substitute_env;
pub use validation::{ServerConfigError, ValidationError, validate_config};
