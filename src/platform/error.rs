//! Error type shared by the engine, codecs and CLI.

#[derive(Debug, thiserror::Error)]
pub enum ProtomutError {
    /// A mutation or initialization would leave an instance structurally invalid.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// CrossOver operands do not share a schema.
    #[error("cross-over mismatch: {0}")]
    CrossOverMismatch(String),

    /// The schema itself is malformed.
    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ProtomutResult<T> = Result<T, ProtomutError>;
