//! Theme engine error types

use thiserror::Error;

/// Theme-specific errors
#[derive(Debug, Error)]
pub enum ThemeError {
    /// Neither the marketplace theme nor the default theme has the template
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Template parsing or rendering error
    #[error("Template error: {0}")]
    TemplateError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
