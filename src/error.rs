//! Typed failures at the service boundary.
//!
//! Internal plumbing (config, stores, CLI) works in `anyhow::Result`. Anything
//! that can reach an HTTP client is converted into a [`ServiceError`] first,
//! so the server maps a closed set of [`ErrorKind`]s to status codes instead
//! of inspecting error strings.
//!
//! Remote calls classify their own failures with [`ServiceError::from_status`]
//! and [`ServiceError::from_transport`].

use thiserror::Error;

/// Coarse classification used for status mapping and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Timeout,
    Unauthorized,
    RateLimited,
    Upstream,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code used in response bodies.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unauthorized => "upstream_unauthorized",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Upstream => "upstream_error",
            ErrorKind::Internal => "internal",
        }
    }

    /// Client-safe message for kinds whose details stay in the logs.
    pub fn generic_message(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "Not found",
            ErrorKind::BadRequest => "Bad request",
            ErrorKind::Timeout => "An upstream service did not respond in time",
            ErrorKind::Unauthorized => "An upstream service rejected our credentials",
            ErrorKind::RateLimited => "An upstream service is rate limiting requests",
            ErrorKind::Upstream => "An upstream service returned an error",
            ErrorKind::Internal => "Internal server error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{service} request timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("{service} rejected credentials (HTTP {status})")]
    Unauthorized { service: &'static str, status: u16 },

    #[error("{service} rate limited the request")]
    RateLimited { service: &'static str },

    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::BadRequest(_) => ErrorKind::BadRequest,
            ServiceError::Timeout { .. } => ErrorKind::Timeout,
            ServiceError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ServiceError::RateLimited { .. } => ErrorKind::RateLimited,
            ServiceError::Upstream { .. } => ErrorKind::Upstream,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn organization_not_found() -> Self {
        ServiceError::NotFound("Organization not found".to_string())
    }

    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Upstream {
            service,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status from a remote service.
    pub fn from_status(service: &'static str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ServiceError::Unauthorized { service, status },
            429 => ServiceError::RateLimited { service },
            408 | 504 => ServiceError::Timeout { service, secs: 0 },
            _ => ServiceError::upstream(service, format!("HTTP {}: {}", status, truncate(body))),
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_transport(service: &'static str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout {
                service,
                secs: timeout_secs,
            }
        } else if let Some(status) = err.status() {
            ServiceError::from_status(service, status.as_u16(), &err.to_string())
        } else {
            ServiceError::upstream(service, err.to_string())
        }
    }
}

/// Keep upstream bodies out of logs when they are pages of HTML.
fn truncate(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let mut s: String = body.chars().take(MAX).collect();
        s.push('…');
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ServiceError::from_status("qdrant", 401, "").kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            ServiceError::from_status("voyage", 403, "").kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            ServiceError::from_status("voyage", 429, "").kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            ServiceError::from_status("qdrant", 504, "").kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            ServiceError::from_status("qdrant", 500, "boom").kind(),
            ErrorKind::Upstream
        );
    }

    #[test]
    fn test_upstream_body_truncated() {
        let body = "x".repeat(1000);
        let err = ServiceError::from_status("qdrant", 500, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn test_anyhow_is_internal() {
        let err: ServiceError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_not_found_message() {
        let err = ServiceError::organization_not_found();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Organization not found");
    }
}
