//! Error types for G-code generation.

use thiserror::Error;

/// Errors that can occur while writing G-code.
#[derive(Error, Debug)]
pub enum GcodeError {
    /// Output could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid machine or G-code settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type for G-code operations.
pub type Result<T> = std::result::Result<T, GcodeError>;
