//! Error types for the VPC infrastructure provider
//!
//! Provider and store failures carry the attempted operation and the identity
//! of the resource involved so the scheduler can log them without re-wrapping.

use thiserror::Error;

/// Main error type for reconciliation passes
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API (resource store) error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Lookup target is absent
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of object that was looked up (e.g. "instance")
        kind: String,
        /// Name or id that was looked up
        name: String,
    },

    /// Remote VPC API call failed
    #[error("provider error during {operation} for {resource}: {message}")]
    Provider {
        /// Operation that was attempted (e.g. "create_vpc")
        operation: String,
        /// Identity of the resource the call was made for
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Provider session could not be built
    #[error("failed to create scope: {0}")]
    Scope(String),

    /// Owner or parent relationship is not linked yet
    #[error("relationship unresolved: {0}")]
    RelationshipUnresolved(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Malformed resource
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a not-found error for the given kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a provider error with operation and resource context
    pub fn provider(
        operation: impl Into<String>,
        resource: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            operation: operation.into(),
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a scope construction error
    pub fn scope(msg: impl Into<String>) -> Self {
        Self::Scope(msg.into())
    }

    /// Create a relationship-unresolved error
    pub fn unresolved(msg: impl Into<String>) -> Self {
        Self::RelationshipUnresolved(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Re-label a provider error with the resource it was issued for.
    ///
    /// The API client only knows the remote object; the scope knows which
    /// Kubernetes resource the call belongs to.
    pub fn for_resource(self, resource: impl Into<String>) -> Self {
        match self {
            Self::Provider {
                operation, message, ..
            } => Self::Provider {
                operation,
                resource: resource.into(),
                message,
            },
            other => other,
        }
    }

    /// Returns true if this error means the lookup target does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}
