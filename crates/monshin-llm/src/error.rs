use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Outbound HTTP failure or timeout against the provider endpoint.
    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider metadata rejected: {0}")]
    InvalidMetadata(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
