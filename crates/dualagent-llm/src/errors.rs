use thiserror::Error;

/// Failures surfaced by provider adapters and the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm configuration error: {0}")]
    Configuration(String),
    #[error("provider '{provider}' request failed: {message}")]
    Provider { provider: String, message: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
}

impl LlmError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
