use thiserror::Error;

/// Core error type for the Sluice runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No flow is registered under the given name
    #[error("Flow type '{0}' not found")]
    FlowNotFound(String),

    /// Flow run not found
    #[error("Flow run not found: {0}")]
    RunNotFound(String),

    /// The run's cancellation handle fired
    #[error("Flow run canceled")]
    Canceled,

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Flow queue error
    #[error("Flow queue error: {0}")]
    QueueError(String),

    /// Flow execution error
    #[error("Flow execution error: {0}")]
    FlowExecutionError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
