//! Remote error types
//!
//! Maps HTTP status codes to variants so the client can decide on retries.
//! The cache layer never inspects these beyond cancellation.

/// Errors reported by a remote source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Authentication failed")]
    Unauthorized,

    #[error("Rate limited, try again after backoff")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Whether the client should retry this request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited
                | RemoteError::Timeout
                | RemoteError::Network(_)
                | RemoteError::Server(_, _)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RemoteError::Cancelled)
    }

    /// Create a RemoteError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::Forbidden(body.to_string()),
            404 => RemoteError::NotFound(body.to_string()),
            408 => RemoteError::Timeout,
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::Server(status, body.to_string()),
            _ => RemoteError::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            RemoteError::Request(e.to_string())
        } else if e.is_timeout() {
            RemoteError::Timeout
        } else if let Some(status) = e.status() {
            RemoteError::from_status(status.as_u16(), &e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_body() {
            RemoteError::Network(e.to_string())
        } else {
            RemoteError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(RemoteError::from_status(401, ""), RemoteError::Unauthorized);
        assert_eq!(
            RemoteError::from_status(404, "gone"),
            RemoteError::NotFound("gone".to_string())
        );
        assert_eq!(RemoteError::from_status(429, ""), RemoteError::RateLimited);
        assert_eq!(
            RemoteError::from_status(503, "busy"),
            RemoteError::Server(503, "busy".to_string())
        );
        assert!(matches!(
            RemoteError::from_status(418, "teapot"),
            RemoteError::Request(_)
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Server(500, String::new()).is_retryable());
        assert!(!RemoteError::NotFound(String::new()).is_retryable());
        assert!(!RemoteError::Cancelled.is_retryable());
        assert!(RemoteError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_builder_error_is_not_retried() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(err.is_builder());

        let mapped = RemoteError::from(err);
        assert!(matches!(mapped, RemoteError::Request(_)));
        assert!(!mapped.is_retryable());
    }
}
