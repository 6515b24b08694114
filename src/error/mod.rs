//! Error handling module for vidpress

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Top-level error for configuration, startup and command execution
#[derive(Error, Debug)]
pub enum VidpressError {
    /// Configuration file or override could not be used
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Logging could not be initialized
    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    /// A compression rule or collaborator failed
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VidpressError {
    pub fn config(message: impl Into<String>) -> Self {
        VidpressError::Config { message: message.into() }
    }
}

/// Result type alias for vidpress operations
pub type VidpressResult<T> = std::result::Result<T, VidpressError>;
