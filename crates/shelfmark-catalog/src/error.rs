use std::time::Duration;

use shelfmark_core::{ShelfError, UpstreamFailure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to reach {upstream}: {source}")]
    Communication {
        upstream: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{upstream} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { upstream: String, timeout: Duration },

    #[error("{upstream} returned HTTP {status}")]
    Status { upstream: String, status: u16 },

    #[error("{upstream} returned an unreadable response: {reason}")]
    Parse { upstream: String, reason: String },

    #[error("invalid catalog query: {0}")]
    InvalidQuery(String),

    #[error("invalid ISBN: {0:?}")]
    InvalidIsbn(String),

    #[error("catalog item not found: {0}")]
    ItemNotFound(String),
}

impl CatalogError {
    /// Failure category of an upstream error, `None` for caller mistakes.
    pub fn failure(&self) -> Option<UpstreamFailure> {
        match self {
            Self::Http(_) | Self::Communication { .. } => Some(UpstreamFailure::Communication),
            Self::Timeout { .. } => Some(UpstreamFailure::Timeout),
            Self::Status { status, .. } => Some(UpstreamFailure::Status(*status)),
            Self::Parse { .. } => Some(UpstreamFailure::InvalidResponse),
            Self::InvalidQuery(_) | Self::InvalidIsbn(_) | Self::ItemNotFound(_) => None,
        }
    }
}

impl From<CatalogError> for ShelfError {
    fn from(error: CatalogError) -> Self {
        let failure = error.failure();
        let message = error.to_string();
        match (error, failure) {
            (CatalogError::InvalidQuery(reason), _) => ShelfError::Validation(reason),
            (CatalogError::InvalidIsbn(raw), _) => ShelfError::InvalidIdentifier(raw),
            (CatalogError::ItemNotFound(isbn), _) => ShelfError::CatalogItemNotFound(isbn),
            (
                CatalogError::Communication { upstream, .. }
                | CatalogError::Timeout { upstream, .. }
                | CatalogError::Status { upstream, .. }
                | CatalogError::Parse { upstream, .. },
                Some(failure),
            ) => ShelfError::UpstreamUnavailable {
                upstream,
                failure,
                message,
            },
            (_, failure) => ShelfError::UpstreamUnavailable {
                upstream: "catalog".to_string(),
                failure: failure.unwrap_or(UpstreamFailure::Communication),
                message,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
