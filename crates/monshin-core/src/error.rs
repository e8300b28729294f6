use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid import mode: {0} (expected \"merge\" or \"replace\")")]
    InvalidImportMode(String),

    #[error("invalid prompt kind: {0}")]
    InvalidPromptKind(String),

    #[error("invalid completion status: {0}")]
    InvalidCompletionStatus(String),

    #[error("invalid second-factor mode: {0}")]
    InvalidTotpMode(String),
}
