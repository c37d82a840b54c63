use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Volume;

pub type SeriesId = i64;

/// One work, e.g. a manga title. Exists only while it owns at least one volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Metadata identifying a series; two series with equal metadata are the same series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSeries {
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
}

impl NewSeries {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            publisher: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }
}

/// Row of the library overview: a series plus the cover chosen to represent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    #[serde(flatten)]
    pub series: Series,
    pub volume_count: usize,
    pub representative_cover_url: Option<String>,
}

/// A series with its volumes in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDetail {
    #[serde(flatten)]
    pub series: Series,
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedSeries {
    pub series_id: SeriesId,
    pub deleted_count: usize,
    pub isbns: Vec<crate::identifiers::Isbn>,
}
