use thiserror::Error;

/// Startup failures: config file, schema, credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no config file found at '{0}' (.dualagent.json or .checkmate.json)")]
    MissingFile(String),
    #[error("failed to read config '{path}': {message}")]
    Read { path: String, message: String },
    #[error("invalid config '{path}': {message}")]
    Parse { path: String, message: String },
    #[error("missing environment variable {var} required by provider '{provider}'")]
    MissingEnvVar { var: String, provider: String },
}

/// Agent response failed JSON parse or schema validation. Fatal to the cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{role} response is not valid JSON: {message}")]
    Parse { role: String, message: String },
    #[error("{role} response failed validation: {message}")]
    Schema { role: String, message: String },
}

impl ProtocolError {
    pub fn parse(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            role: role.into(),
            message: message.into(),
        }
    }

    pub fn schema(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            role: role.into(),
            message: message.into(),
        }
    }
}

/// Patch rejected before it reached the filesystem.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Patch touches disallowed path: {0}")]
    DisallowedPath(String),
    #[error("patch contains no recognizable file headers")]
    UnrecognizedDiff,
    #[error("invalid allow-list pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// `git apply` failed, or the temp patch file could not be managed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("failed to stage patch file: {0}")]
    TempFile(String),
    #[error("git apply failed: {0}")]
    GitApply(String),
}

/// Top-level error type for the orchestration core.
///
/// Sub-process runs that merely exit non-zero are not errors; they come back
/// as a normal `RunResult` and feed the feedback loop.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Llm(#[from] dualagent_llm::LlmError),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("event delivery failed: {0}")]
    Event(String),
}
