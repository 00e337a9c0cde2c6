use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("Failed to initialize chat model: {0}")]
    ModelInit(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("mcp error: {0}")]
    Mcp(String),

    #[error("log lifecycle error: {0}")]
    LogLifecycle(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for failures that happened while building the chat model.
    pub fn is_model_init(&self) -> bool {
        matches!(self, Error::ModelInit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn model_init_message_carries_prefix() {
        let err = Error::ModelInit("Unsupported model_provider: foo".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to initialize chat model: Unsupported model_provider: foo"
        );
        assert!(err.is_model_init());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_model_init());
    }
}
