use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("response did not conform to expected schema: {0}")]
    SchemaViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model not supported: {0}")]
    UnsupportedModel(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("streaming channel closed before the response completed")]
    ChannelClosed,
}
