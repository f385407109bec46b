//! HTTP API errors.

use thiserror::Error;

/// Failures talking to the analysis backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend rejected the credentials (401 or 403).
    #[error("unauthorized (HTTP {status})")]
    Unauthorized {
        /// Response status.
        status: u16,
    },

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The request never got a response.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request exceeded its time budget.
    #[error("request timed out")]
    Timeout,

    /// The response body was not what the endpoint promises.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A local file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Whether trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Unauthorized { .. }
            | Self::NotFound(_)
            | Self::Decode(_)
            | Self::InvalidRequest(_)
            | Self::Io(_) => false,
        }
    }

    /// Short category name for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "auth",
            Self::NotFound(_) => "not_found",
            Self::Http { .. } => "http",
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Decode(_) => "decode",
            Self::InvalidRequest(_) | Self::Io(_) => "request",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err)
        }
    }
}

/// Result type for the API client.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ApiError::Timeout.is_retryable());
        assert!(
            ApiError::Http {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ApiError::Http {
                status: 422,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!ApiError::Unauthorized { status: 401 }.is_retryable());
        assert!(!ApiError::NotFound("analysis/x".into()).is_retryable());
        assert!(!ApiError::Decode("bad".into()).is_retryable());
    }

    #[test]
    fn categories() {
        assert_eq!(ApiError::Timeout.category(), "timeout");
        assert_eq!(ApiError::Unauthorized { status: 403 }.category(), "auth");
        assert_eq!(ApiError::InvalidRequest("x".into()).category(), "request");
    }

    #[test]
    fn display() {
        let err = ApiError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }
}
