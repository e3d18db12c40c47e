//! Error types for MediaTrack Core
//!
//! Rule violations and caller misuse are not errors: they are logged and
//! surfaced as booleans or [`crate::rules::RuleResponse`]. This type covers
//! the plumbing underneath (store, wire encoding, network).

use thiserror::Error;

/// Result type alias for tracker plumbing
pub type Result<T> = std::result::Result<T, Error>;

/// Tracker error types
#[derive(Error, Debug)]
pub enum Error {
    // Store errors
    #[cfg(feature = "sqlite")]
    #[error("Hit store error: {0}")]
    Store(#[from] rusqlite::Error),

    // Encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP request failed with status {status}")]
    Http { status: u16 },

    #[error("Connection timeout")]
    ConnectionTimeout,

    // Runtime errors
    #[error("No tokio runtime available to drive background work")]
    NoRuntime,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if a later delivery attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Http { .. } | Error::ConnectionTimeout
        )
    }

    /// Returns the error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Error::Store(_) => "STORE",
            Error::Json(_) => "JSON",
            Error::Network(_) => "NETWORK",
            Error::Http { .. } => "HTTP",
            Error::ConnectionTimeout => "TIMEOUT",
            Error::NoRuntime => "NO_RUNTIME",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Http { status: 503 }.is_recoverable());
        assert!(Error::ConnectionTimeout.is_recoverable());
        assert!(!Error::Io(std::io::Error::other("denied")).is_recoverable());
        assert!(!Error::NoRuntime.is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Http { status: 404 }.error_code(), "HTTP");
        assert_eq!(Error::Io(std::io::Error::other("gone")).error_code(), "IO");
        assert_eq!(
            Error::Http { status: 404 }.to_string(),
            "HTTP request failed with status 404"
        );
    }
}
