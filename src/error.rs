//! Error types for the guardgen generation pipeline.

use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Value cannot be represented in storage: {0}")]
    Unrepresentable(String),

    #[error("Failed to encode record: {0}")]
    Encode(String),

    #[error("Failed to decode record: {0}")]
    Decode(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("sled: {}", err),
        ))
    }
}

/// Provider-level failures, classified the way the HTTP clients see them.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Provider model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Provider returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("Provider error: {0}")]
    Other(String),
}

/// Errors surfaced by aggregation, generation, orchestration and the job controller.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM provider is not configured: {0}")]
    Configuration(String),

    #[error("Upstream provider failure: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Generation timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },

    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    #[error("Failed to persist artifact: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("All {0} generation passes failed")]
    AllAgentsFailed(usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl GenerationError {
    /// Stable error code exposed to callers.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Configuration(_) => "LLM_CONFIGURATION_REQUIRED",
            GenerationError::Timeout { .. } => "GENERATION_TIMEOUT",
            GenerationError::DependencyMissing(_) => "GUARDRAILS_REQUIRED",
            GenerationError::NotFound(_) => "NOT_FOUND",
            GenerationError::InvalidRequest(_) => "INVALID_REQUEST",
            GenerationError::Upstream(ProviderError::AuthFailed(_)) => {
                "LLM_CONFIGURATION_REQUIRED"
            }
            GenerationError::Upstream(_)
            | GenerationError::Persistence(_)
            | GenerationError::AllAgentsFailed(_)
            | GenerationError::Storage(_) => "GENERATION_FAILED",
        }
    }

    /// HTTP-style status matching [`GenerationError::code`].
    pub fn status(&self) -> u16 {
        match self.code() {
            "LLM_CONFIGURATION_REQUIRED" => 503,
            "GENERATION_TIMEOUT" => 504,
            "GUARDRAILS_REQUIRED" | "INVALID_REQUEST" => 400,
            "NOT_FOUND" => 404,
            _ => 500,
        }
    }

    /// Authentication failures are configuration problems, not transient ones.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GenerationError::Configuration(_)
                | GenerationError::Upstream(ProviderError::AuthFailed(_))
        )
    }
}

/// Startup failures: loading configuration, opening storage, installing the subscriber.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed:\n{0}")]
    Invalid(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<config::ConfigError> for SetupError {
    fn from(err: config::ConfigError) -> Self {
        SetupError::Config(err.to_string())
    }
}
