use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SeriesId;

/// All errors that can occur in shelfmark-core.
#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("invalid ISBN: {0:?} (expected 13 digits)")]
    InvalidIdentifier(String),

    #[error("no ISBN could be extracted from scanned text: {0:?}")]
    IdentifierNotExtractable(String),

    #[error("volume already exists: {isbn} (series {series_id})")]
    AlreadyExists { isbn: String, series_id: SeriesId },

    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    #[error("series not found: {0}")]
    SeriesNotFound(SeriesId),

    #[error("catalog item not found: {0}")]
    CatalogItemNotFound(String),

    #[error("{isbn} was processed recently, retry in {}s", .retry_after.as_secs().max(1))]
    RecentlyProcessed { isbn: String, retry_after: Duration },

    #[error("{upstream} unavailable ({failure}): {message}")]
    UpstreamUnavailable {
        upstream: String,
        failure: UpstreamFailure,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Coarse classification used by callers to pick a message and a retry affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIdentifier,
    IdentifierNotExtractable,
    AlreadyExists,
    NotFound,
    RecentlyProcessed,
    UpstreamUnavailable,
    Validation,
    Internal,
}

/// How a call to an upstream catalog failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamFailure {
    Timeout,
    Communication,
    Status(u16),
    InvalidResponse,
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Communication => f.write_str("communication"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::InvalidResponse => f.write_str("invalid response"),
        }
    }
}

impl ShelfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::IdentifierNotExtractable(_) => ErrorKind::IdentifierNotExtractable,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::VolumeNotFound(_) | Self::SeriesNotFound(_) | Self::CatalogItemNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::RecentlyProcessed { .. } => ErrorKind::RecentlyProcessed,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Database(_)
            | Self::TomlParse(_)
            | Self::TomlSerialize(_) => ErrorKind::Internal,
        }
    }

    /// The identifier or series the error is about, if any.
    pub fn subject(&self) -> Option<String> {
        match self {
            Self::InvalidIdentifier(raw) | Self::IdentifierNotExtractable(raw) => Some(raw.clone()),
            Self::AlreadyExists { isbn, .. }
            | Self::RecentlyProcessed { isbn, .. }
            | Self::VolumeNotFound(isbn)
            | Self::CatalogItemNotFound(isbn) => Some(isbn.clone()),
            Self::SeriesNotFound(id) => Some(id.to_string()),
            Self::UpstreamUnavailable { upstream, .. } => Some(upstream.clone()),
            _ => None,
        }
    }

    /// Only upstream failures are worth offering a retry for, and only on explicit user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

/// Exit codes for the command line front end.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    NetworkError = 6,
    Conflict = 7,
    TryLater = 9,
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidIdentifier
            | ErrorKind::IdentifierNotExtractable
            | ErrorKind::Validation => ExitCode::InvalidArgs,
            ErrorKind::AlreadyExists => ExitCode::Conflict,
            ErrorKind::NotFound => ExitCode::NotFound,
            ErrorKind::RecentlyProcessed => ExitCode::TryLater,
            ErrorKind::UpstreamUnavailable => ExitCode::NetworkError,
            ErrorKind::Internal => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShelfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_not_found_variants() {
        assert_eq!(ShelfError::SeriesNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(
            ShelfError::VolumeNotFound("9784088836440".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ShelfError::CatalogItemNotFound("9784088836440".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn only_upstream_failures_are_retryable() {
        let upstream = ShelfError::UpstreamUnavailable {
            upstream: "NDL Search".into(),
            failure: UpstreamFailure::Timeout,
            message: "timed out".into(),
        };
        assert!(upstream.is_retryable());
        assert!(!ShelfError::InvalidIdentifier("978-abc".into()).is_retryable());
        assert_eq!(upstream.subject().as_deref(), Some("NDL Search"));
    }

    #[test]
    fn recently_processed_message_rounds_up_to_a_second() {
        let err = ShelfError::RecentlyProcessed {
            isbn: "9784088836440".into(),
            retry_after: Duration::from_millis(200),
        };
        assert_eq!(
            err.to_string(),
            "9784088836440 was processed recently, retry in 1s"
        );
        assert_eq!(ExitCode::from(err.kind()), ExitCode::TryLater);
    }
}
