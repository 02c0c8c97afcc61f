//! Error types for the auth crate.

use thiserror::Error;

/// Errors that can occur in authorization operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input was provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Cannot remove or demote the last owner of an organization.
    #[error("cannot remove last owner of organization")]
    LastOwner,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::InvalidArgument(errors.to_string())
    }
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
