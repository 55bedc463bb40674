//! Error types for the access control engine

use canopy_tree::TreeError;
use thiserror::Error;

/// Result type for access control operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling or evaluating permissions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid access control entry: {0}")]
    InvalidEntry(String),

    #[error("Repository access failed: {0}")]
    RepositoryAccess(#[from] TreeError),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Unknown privilege: {0}")]
    UnknownPrivilege(String),

    #[error("Invalid privilege definition: {0}")]
    InvalidPrivilege(String),

    #[error("Access control error: {0}")]
    AccessControl(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
