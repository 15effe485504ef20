//! Vault error types using thiserror 2.0.
//!
//! Fallback conditions inside the token chain (an unavailable strategy or a
//! rejected candidate) never surface here; everything below crosses the
//! component boundary.

use thiserror::Error;

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Vault server unavailable or returned an unexpected status
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A token source failed unexpectedly while the chain was running
    #[error("unknown error getting token from {source_name}: {source}")]
    TokenSource {
        /// Name of the strategy that failed
        source_name: String,
        /// Underlying failure
        #[source]
        source: Box<VaultError>,
    },

    /// Every token source was tried and none produced a valid token
    #[error("no token found")]
    NoTokenFound,

    /// Secret absent or unreadable
    #[error("Secret not found at path: {0}")]
    SecretNotFound(String),

    /// Response received but not in the expected shape
    #[error("Unexpected response shape: {0}")]
    DataShape(String),

    /// Mount path not present in the mount table
    #[error("{0} is not a valid mount path")]
    MountNotFound(String),

    /// Mount present but its options carry no version
    #[error("unable to determine mount version: version not specified in options of {0}")]
    MountVersionUnspecified(String),

    /// Mount version option is not a number
    #[error("unable to parse version of mountpoint '{mount}': {value:?}")]
    InvalidMountVersion {
        /// Mount path
        mount: String,
        /// Raw option value
        value: String,
    },

    /// Instance identity document could not be fetched
    #[error("unable to get instance identity document: {0}")]
    IdentityDocument(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request rejected as malformed, including check-and-set conflicts
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limited
    #[error("Rate limited")]
    RateLimited,
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Check if error is retryable.
    ///
    /// Nothing in this crate retries; the classification is for callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::RateLimited | Self::Http(_) | Self::IdentityDocument(_)
        )
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create a secret not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::SecretNotFound(path.into())
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a data shape error.
    #[must_use]
    pub fn data_shape(msg: impl Into<String>) -> Self {
        Self::DataShape(msg.into())
    }

    /// Wrap a failure raised by the named token source.
    #[must_use]
    pub fn token_source(name: impl Into<String>, source: Self) -> Self {
        Self::TokenSource {
            source_name: name.into(),
            source: Box::new(source),
        }
    }
}
