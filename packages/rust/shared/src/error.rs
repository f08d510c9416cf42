//! Error types for AskDocs.
//!
//! Library crates use [`AskDocsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all AskDocs operations.
#[derive(Debug, thiserror::Error)]
pub enum AskDocsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a sitemap or page.
    #[error("network error: {0}")]
    Network(String),

    /// Sitemap or response body parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The page tree violated an assumption of the text renderer.
    #[error("render error: {message}")]
    Render { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Hosted assistant service error.
    #[error("assistant error: {message}")]
    Assistant {
        /// HTTP status returned by the service, if the request got that far.
        status: Option<u16>,
        message: String,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AskDocsError>;

impl AskDocsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a render error from any displayable message.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    /// Create an assistant error that never reached an HTTP response.
    pub fn assistant(msg: impl Into<String>) -> Self {
        Self::Assistant {
            status: None,
            message: msg.into(),
        }
    }

    /// Create an assistant error for a non-success HTTP response.
    pub fn assistant_status(status: u16, msg: impl Into<String>) -> Self {
        Self::Assistant {
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AskDocsError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = AskDocsError::render("anchor without href");
        assert_eq!(err.to_string(), "render error: anchor without href");

        let err = AskDocsError::assistant_status(404, "No thread found");
        assert!(err.to_string().contains("No thread found"));
        assert!(matches!(err, AskDocsError::Assistant { status: Some(404), .. }));
    }
}
