//! Core error types
//!
//! Error definitions for the resource model, with classification helpers
//! used by the orchestrators to decide what aborts a run and what is
//! absorbed.

use thiserror::Error;

/// Error that can occur in the resource model.
#[derive(Debug, Error)]
pub enum CoreError {
    // Input errors (caller supplied something malformed)
    /// Resource name was empty or whitespace.
    #[error("resource name must not be empty or whitespace")]
    EmptyResourceName,

    /// Revision suffix did not parse as a positive integer.
    #[error("invalid revision suffix in '{name}'")]
    InvalidRevision { name: String },

    /// Configuration file could not be parsed.
    #[error("malformed configuration: {message}")]
    MalformedConfiguration { message: String },

    /// A file matched more than one resource kind.
    #[error("ambiguous file '{path}': matches {first} and {second}")]
    AmbiguousFile {
        path: String,
        first: &'static str,
        second: &'static str,
    },

    // Schema errors (a DTO did not fit its declared shape)
    /// DTO failed to round-trip through its typed schema.
    #[error("schema mismatch for {kind}: {source}")]
    Schema {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A required property was absent from a DTO.
    #[error("missing property '{path}'")]
    MissingProperty { path: String },

    /// A value expected to be a JSON object was something else.
    #[error("expected a JSON object at '{path}'")]
    NotJsonObject { path: String },

    /// A reference id could not be interpreted.
    #[error("malformed reference id '{id}'")]
    MalformedReferenceId { id: String },
}

impl CoreError {
    /// Create a malformed-configuration error.
    pub fn malformed_configuration(message: impl Into<String>) -> Self {
        CoreError::MalformedConfiguration {
            message: message.into(),
        }
    }

    /// Create a missing-property error.
    pub fn missing_property(path: impl Into<String>) -> Self {
        CoreError::MissingProperty { path: path.into() }
    }

    /// Create a not-a-JSON-object error.
    pub fn not_json_object(path: impl Into<String>) -> Self {
        CoreError::NotJsonObject { path: path.into() }
    }

    /// True when the error is a schema problem rather than bad input.
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            CoreError::Schema { .. }
                | CoreError::MissingProperty { .. }
                | CoreError::NotJsonObject { .. }
                | CoreError::MalformedReferenceId { .. }
        )
    }
}

/// Result type for resource-model operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_classification() {
        assert!(CoreError::missing_property("properties.value").is_schema());
        assert!(CoreError::not_json_object("$").is_schema());
        assert!(!CoreError::EmptyResourceName.is_schema());
        assert!(!CoreError::malformed_configuration("bad yaml").is_schema());
    }

    #[test]
    fn display_messages() {
        let err = CoreError::MissingProperty {
            path: "properties.scope".to_string(),
        };
        assert_eq!(err.to_string(), "missing property 'properties.scope'");

        let err = CoreError::InvalidRevision {
            name: "api1;rev=zero".to_string(),
        };
        assert_eq!(err.to_string(), "invalid revision suffix in 'api1;rev=zero'");
    }
}
