// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for kubesweep policy and cluster operations
#[derive(Error, Debug, Diagnostic)]
pub enum SweepError {
    /// A namespace pattern failed to compile
    #[error("Invalid namespace pattern '{pattern}': {message}")]
    #[diagnostic(
        code(kubesweep::invalid_pattern),
        help("Patterns are regular expressions matched from the start of the namespace name, e.g. `std-.*`")
    )]
    InvalidPattern {
        #[allow(unused)]
        pattern: String,
        #[allow(unused)]
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(kubesweep::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// A cluster API call failed
    #[error("API request '{operation}' failed: {message}")]
    #[diagnostic(
        code(kubesweep::api_request_failed),
        help("The item is skipped for this pass and retried on the next one")
    )]
    ApiRequest {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        message: String,
    },

    /// The resource disappeared between listing and acting on it
    #[error("Resource not found: {resource}")]
    #[diagnostic(
        code(kubesweep::not_found),
        help("The resource was removed after the snapshot was taken. No action is needed")
    )]
    NotFound {
        #[allow(unused)]
        resource: String,
    },
}

/// Result type alias for kubesweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

impl SweepError {
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn api_request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiRequest {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether a reconcile pass may log this error and move on to the next item
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ApiRequest { .. } | Self::NotFound { .. })
    }
}
