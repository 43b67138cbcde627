use hyper::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single catalog call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("rate limited by catalog")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<CatalogError>,
    },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("could not decode catalog response: {0}")]
    Decode(String),

    #[error("{0} is not supported by this catalog")]
    Unsupported(&'static str),
}

impl CatalogError {
    /// Classifies an HTTP status returned by a catalog API.
    pub fn from_status(status: StatusCode, resource: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Authentication(message),
            StatusCode::NOT_FOUND => Self::NotFound(resource.to_string()),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after: None },
            StatusCode::REQUEST_TIMEOUT => Self::Transient(message),
            s if s.is_server_error() => Self::Transient(format!("{s}: {message}")),
            s => Self::Rejected(format!("{s}: {message}")),
        }
    }

    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    /// Aborts every mapping that depends on the catalog.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// The catalog could not be reached, even after retrying. Nothing can be
    /// concluded about the resource.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transient(_) | Self::RetriesExhausted { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Transient(_) | Self::RetriesExhausted { .. } => ErrorKind::TransientNetwork,
            Self::Rejected(_) | Self::Decode(_) | Self::Unsupported(_) => ErrorKind::Catalog,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::from_status(status, "resource", e.to_string());
        }
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return Self::Transient(e.to_string());
        }
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        Self::Transient(e.to_string())
    }
}

/// Coarse classification carried into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    NotFound,
    RateLimit,
    TransientNetwork,
    UnresolvedTrack,
    PartialMutation,
    Catalog,
}

/// Failures outside the per-mapping engine: setup and configuration.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] confy::ConfyError),

    #[error("{0} is not set")]
    MissingSetting(&'static str),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("could not create catalog client: {0}")]
    Client(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(CatalogError::from_status(StatusCode::UNAUTHORIZED, "x", "").is_fatal());
        assert!(CatalogError::from_status(StatusCode::NOT_FOUND, "playlist", "").is_not_found());
        assert!(CatalogError::from_status(StatusCode::TOO_MANY_REQUESTS, "x", "").is_transient());
        assert!(CatalogError::from_status(StatusCode::BAD_GATEWAY, "x", "").is_transient());
        assert!(!CatalogError::from_status(StatusCode::BAD_REQUEST, "x", "").is_transient());
    }

    #[test]
    fn exhausted_retries_are_not_retried_again() {
        let err = CatalogError::RetriesExhausted {
            attempts: 3,
            last: Box::new(CatalogError::Transient("timeout".into())),
        };
        assert!(!err.is_transient());
        assert!(err.is_unavailable());
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(!CatalogError::Rejected("bad query".into()).is_unavailable());
    }
}
