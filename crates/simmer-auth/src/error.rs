//! Error types for the authentication caching layer
//!
//! Cache and rate-limit operations never surface these errors to their
//! callers; they absorb failures internally and return their documented
//! fallback values. `AuthError` crosses a public boundary in exactly two
//! places: the [`TokenVerifier`](crate::service::TokenVerifier)
//! collaborator (whose result is passed through unchanged) and
//! configuration validation at startup.

use thiserror::Error;

/// Errors produced by the authentication layer and its collaborators.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable credential was presented.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Details about the missing or malformed credential.
        message: String,
    },

    /// The authoritative verifier rejected the credential or failed.
    #[error("Verification failed: {message}")]
    Verification {
        /// Details reported by the verification collaborator.
        message: String,
    },

    /// A distributed store operation failed.
    #[error("Store error: {message}")]
    Store {
        /// Details about the failed store operation.
        message: String,
    },

    /// Encoding or decoding a cached entry failed.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Details about the malformed payload.
        message: String,
    },

    /// The layer was configured with invalid values.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Which setting is invalid and why.
        message: String,
    },

    /// An unexpected internal condition.
    #[error("Internal error: {message}")]
    Internal {
        /// Details about the unexpected condition.
        message: String,
    },
}

impl AuthError {
    // =========================================================================
    // Constructor Methods
    // =========================================================================

    /// Create an `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a `Verification` error.
    #[must_use]
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }

    /// Create a `Store` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Predicate Methods
    // =========================================================================

    /// Returns `true` if the request itself was at fault (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Verification { .. })
    }

    /// Returns `true` if the layer or its collaborators were at fault
    /// (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if this error came from the distributed store or
    /// its value encoding.
    #[must_use]
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Serialization { .. })
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Get the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } | Self::Verification { .. } => ErrorCategory::Credential,
            Self::Store { .. } | Self::Serialization { .. } => ErrorCategory::Cache,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Broad classification used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The credential was missing, malformed, or rejected.
    Credential,
    /// A cache tier or its value encoding misbehaved.
    Cache,
    /// Invalid configuration.
    Configuration,
    /// Unexpected internal condition.
    Internal,
}

/// Result type for authentication layer operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Credential => "credential",
            Self::Cache => "cache",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_display_and_predicates() {
        let err = AuthError::unauthorized("missing bearer token");
        assert_eq!(err.to_string(), "Unauthorized: missing bearer token");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Credential);
    }

    #[test]
    fn test_store_error_predicates() {
        let err = AuthError::store("connection refused");
        assert!(err.is_store_error());
        assert!(err.is_server_error());
        assert!(!err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::Cache);
    }

    #[test]
    fn test_serialization_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = AuthError::from(json_err);
        assert!(err.is_store_error());
        assert_eq!(err.category(), ErrorCategory::Cache);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Credential.to_string(), "credential");
        assert_eq!(ErrorCategory::Cache.to_string(), "cache");
        assert_eq!(
            AuthError::configuration("bad ttl").category().to_string(),
            "configuration"
        );
    }
}
