//! Error types for the Portico operator
//!
//! Errors carry the gateway name or external URL they relate to so that a
//! failed reconciliation can be diagnosed from the log line alone.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Portico operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (fetch, create, update, patch)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The external content source could not be queried
    #[error("external source error for {url}: {message}")]
    ExternalSource {
        /// Repository URL that was queried
        url: String,
        /// Description of what failed
        message: String,
    },

    /// The gateway spec produced an invalid sub-object
    #[error("synthesis error for {gateway}: {message}")]
    Synthesis {
        /// Name of the gateway being synthesized
        gateway: String,
        /// Description of what's invalid
        message: String,
    },

    /// Validation error for CRD specs
    #[error("validation error for {gateway}: {message}")]
    Validation {
        /// Name of the gateway with invalid configuration
        gateway: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.app.image")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "git")
        context: String,
    },
}

impl Error {
    /// Create an external source error for the given URL
    pub fn external_source(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ExternalSource {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a synthesis error for the given gateway
    pub fn synthesis(gateway: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Synthesis {
            gateway: gateway.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            gateway: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with gateway context and field path
    pub fn validation_for_field(
        gateway: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            gateway: gateway.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True when the API server rejected a write because the
    /// resourceVersion was stale (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec change. Conflicts and
    /// throttling are retried even though they are 4xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if ae.code == 409 || ae.code == 429 => true,
                kube::Error::Api(ae) => !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::ExternalSource { .. } => true,
            Error::Synthesis { .. } => true,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the gateway name if this error is associated with a specific gateway
    pub fn gateway(&self) -> Option<&str> {
        match self {
            Error::Synthesis { gateway, .. } => Some(gateway),
            Error::Validation { gateway, .. } => Some(gateway),
            _ => None,
        }
    }
}
