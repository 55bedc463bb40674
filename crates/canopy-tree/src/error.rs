//! Error types for content tree access

use thiserror::Error;

/// Result type for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors raised by a content tree or one of its sessions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Item already exists: {0}")]
    ItemExists(String),

    #[error("Invalid item state: {0}")]
    InvalidItemState(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}
