//! Error types for the memory engine.
//!
//! Errors are split by subsystem: [`MemoryError`] for store and manager
//! failures, [`UploadError`] for the cloud upload pipeline, and
//! [`AgentError`] for the LLM dispatch path. The split matters for
//! propagation policy: manager errors reach the router (which logs and
//! keeps sibling dispatches alive), upload errors are fatal only to their
//! placeholder, and agent errors collapse into sentinel reply tokens at
//! the coordinator boundary.

use thiserror::Error;

/// Errors from the store and the memory managers.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// An entity lookup missed. Surfaced to the caller, never retried.
    #[error("{kind} with id {id} not found")]
    NotFound {
        /// Entity kind (e.g. `"episodic event"`).
        kind: &'static str,
        /// The id that missed.
        id: String,
    },

    /// A tool call violated a documented contract (e.g.
    /// `core_memory_replace` with old content that is not a substring).
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// What was violated.
        message: String,
    },

    /// A required field was missing or empty on insert.
    #[error("validation failed: {message}")]
    Validation {
        /// Which field and why.
        message: String,
    },

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Embedding computation failed.
    #[error("embedding error: {message}")]
    Embedding {
        /// Provider-reported cause.
        message: String,
    },

    /// JSON (de)serialization of a stored field failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure during snapshot or restore.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied timezone string did not parse.
    #[error("unknown timezone: {value}")]
    Timezone {
        /// The rejected value.
        value: String,
    },
}

/// Errors from the cloud upload pipeline.
///
/// Transient errors are retried per the worker's retry budget; permanent
/// errors and timeouts drop the placeholder. Neither is fatal to the
/// system: the accumulator evicts the affected observation and moves on.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Retryable failure (network, provider hiccup).
    #[error("transient upload failure: {message}")]
    Transient {
        /// Provider-reported cause.
        message: String,
    },

    /// Non-retryable failure, or the retry budget was exhausted.
    #[error("permanent upload failure: {message}")]
    Permanent {
        /// Provider-reported cause.
        message: String,
    },

    /// A single attempt or a caller-side wait exceeded its deadline.
    #[error("upload timed out after {seconds}s for {path}")]
    Timeout {
        /// The deadline that was exceeded.
        seconds: u64,
        /// Local path of the file being uploaded.
        path: String,
    },
}

impl UploadError {
    /// Returns `true` if the worker should retry this attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Errors from the LLM dispatch path (queue, providers, tool loop).
#[derive(Debug, Error)]
pub enum AgentError {
    /// Provider API call failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider-reported cause.
        message: String,
        /// HTTP status if one was received.
        status: Option<u16>,
    },

    /// The provider response did not match the expected shape.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Diagnostic message.
        message: String,
        /// The raw content that failed to parse.
        content: String,
    },

    /// A tool call failed during execution.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure detail.
        message: String,
    },

    /// The model kept requesting tools beyond the iteration budget.
    #[error("tool loop exceeded {max_iterations} iterations")]
    ToolLoopExceeded {
        /// The budget that was exhausted.
        max_iterations: usize,
    },

    /// Router- or queue-level coordination failure.
    #[error("dispatch failed: {message}")]
    Dispatch {
        /// Failure detail.
        message: String,
    },

    /// No API key available for the required provider.
    #[error("missing API key for provider '{provider}'")]
    MissingApiKey {
        /// Provider name (e.g. `"openai"`).
        provider: String,
    },

    /// The requested model is not in the registry.
    #[error("unsupported model: {name}")]
    UnsupportedModel {
        /// The rejected model name.
        name: String,
    },

    /// A memory manager failed while servicing a tool call.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Errors while loading the YAML agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML did not parse or did not match the schema.
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A recognized option carried an unusable value.
    #[error("invalid config value: {message}")]
    Invalid {
        /// Which option and why.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = MemoryError::NotFound {
            kind: "episodic event",
            id: "ep_mem_123".to_string(),
        };
        assert_eq!(err.to_string(), "episodic event with id ep_mem_123 not found");
    }

    #[test]
    fn test_upload_transient_classification() {
        assert!(
            UploadError::Transient {
                message: "reset".to_string()
            }
            .is_transient()
        );
        assert!(
            UploadError::Timeout {
                seconds: 30,
                path: "/tmp/a.png".to_string()
            }
            .is_transient()
        );
        assert!(
            !UploadError::Permanent {
                message: "forbidden".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_memory_error_converts_into_agent_error() {
        let mem = MemoryError::InvariantViolation {
            message: "old content not present".to_string(),
        };
        let agent: AgentError = mem.into();
        assert!(agent.to_string().contains("old content not present"));
    }
}
