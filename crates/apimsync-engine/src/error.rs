//! Engine error types
//!
//! Errors raised while talking to the management service, reading file
//! sources, and validating publisher relationships. Classification helpers
//! tell the orchestrators which failures abort a run, which mean "absent",
//! and which mean "this tier does not support the resource".

use thiserror::Error;

use apimsync_core::error::CoreError;

/// Error that can occur while extracting or publishing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Resource-model failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Non-success response from the management service.
    #[error("management request failed: {method} {url} returned {status}: {body}")]
    Api {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// Transport failure before a response was obtained.
    #[error("network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// File-source I/O failure.
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Git subprocess failure.
    #[error("git failed: {message}")]
    Git { message: String },

    /// Relationship validation found inconsistencies; every message kept.
    #[error("relationship validation failed:\n{}", messages.join("\n"))]
    RelationshipValidation { messages: Vec<String> },

    /// A composite resource's secondary half is absent.
    #[error("secondary resource missing for '{key}'")]
    MissingSecondary { key: String },

    /// The run was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Create an i/o error tagged with the offending path.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a git error.
    pub fn git(message: impl Into<String>) -> Self {
        EngineError::Git {
            message: message.into(),
        }
    }

    /// True for a classified 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Api { status: 404, .. })
    }

    /// True when the response fingerprint means the service tier does not
    /// offer the probed resource kind.
    pub fn is_sku_unsupported(&self) -> bool {
        match self {
            EngineError::Api { status, body, .. } => {
                let body = body.to_ascii_lowercase();
                (*status == 400 && body.contains("methodnotallowedinpricingtier"))
                    || (*status == 500
                        && body.contains("request processing failed due to internal error"))
            }
            _ => false,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
