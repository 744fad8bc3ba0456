//! Result and error types for Jornada.

use thiserror::Error;

/// Result type for Jornada operations
pub type JornadaResult<T> = Result<T, JornadaError>;

/// Errors that can occur in Jornada
#[derive(Debug, Error)]
pub enum JornadaError {
    /// Network capture was started twice on the same manager
    #[error("network capture already started")]
    AlreadyStarted,

    /// Network capture was stopped without a running capture
    #[error("network capture not started")]
    NotStarted,

    /// Fixture error (setup/teardown failed)
    #[error("Fixture error: {message}")]
    FixtureError {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunchError {
        /// Error message
        message: String,
    },

    /// Page error
    #[error("Page error: {message}")]
    PageError {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// JavaScript evaluation error
    #[error("Evaluation failed: {message}")]
    EvalError {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_messages() {
        assert_eq!(
            JornadaError::AlreadyStarted.to_string(),
            "network capture already started"
        );
        assert_eq!(
            JornadaError::NotStarted.to_string(),
            "network capture not started"
        );
    }

    #[test]
    fn test_navigation_error_includes_url() {
        let err = JornadaError::NavigationError {
            url: "https://example.com".to_string(),
            message: "timed out".to_string(),
        };
        assert!(err.to_string().contains("https://example.com"));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("not json");
        let err: JornadaError = parse.unwrap_err().into();
        assert!(matches!(err, JornadaError::Json(_)));
    }
}
