//! Error types for talking to the hiking platform
//!
//! The variants map onto how workers react: an auth failure aborts the cycle,
//! a fetch failure skips one item, a structural failure aborts the cycle because
//! the batch itself could not be defined.

use thiserror::Error;

/// Why a single external lookup failed
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The requested resource does not exist on the platform
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Non-success status other than 404
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The page loaded but the expected element was missing or malformed
    #[error("Failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            what,
            reason: reason.into(),
        }
    }

    /// Server-side or transport hiccups worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Errors returned by a [`crate::platform::PlatformClient`]
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Login was rejected or produced no session cookie
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// One item's lookup failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The call that defines a whole batch failed
    #[error("Could not retrieve batch: {0}")]
    Structural(String),
}

impl PlatformError {
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth(reason.into())
    }

    pub fn structural(reason: impl std::fmt::Display) -> Self {
        Self::Structural(reason.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Fetch(FetchError::NotFound(_)))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transient() {
        let server = FetchError::Status {
            status: 503,
            url: "https://example.com".to_string(),
        };
        assert!(server.is_transient());

        let throttled = FetchError::Status {
            status: 429,
            url: "https://example.com".to_string(),
        };
        assert!(throttled.is_transient());

        let forbidden = FetchError::Status {
            status: 403,
            url: "https://example.com".to_string(),
        };
        assert!(!forbidden.is_transient());
    }

    #[test]
    fn test_not_found_is_not_transient() {
        let err = PlatformError::from(FetchError::NotFound("/routes/1/".to_string()));
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_display() {
        let err = PlatformError::from(FetchError::parse("user points", "no digits"));
        assert_eq!(
            err.to_string(),
            "Fetch failed: Failed to parse user points: no digits"
        );
        assert!(PlatformError::auth("bad password")
            .to_string()
            .contains("bad password"));
    }
}
