use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::Isbn;
use crate::models::{Series, SeriesId};

/// One physical, owned book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub isbn: Isbn,
    pub series_id: SeriesId,
    /// `None` means the position in the series is unknown, which is a valid permanent state.
    pub volume_number: Option<u32>,
    /// Reference URL only, never image data.
    pub cover_url: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl Volume {
    /// Cover URL with blank strings treated as missing.
    pub fn cover(&self) -> Option<&str> {
        self.cover_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVolume {
    pub isbn: Isbn,
    pub volume_number: Option<u32>,
    pub cover_url: Option<String>,
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredVolume {
    pub series: Series,
    pub volume: Volume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedVolume {
    pub isbn: Isbn,
    pub series_id: SeriesId,
    pub remaining_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(cover_url: Option<&str>) -> Volume {
        Volume {
            isbn: Isbn::parse("9784088836440").unwrap(),
            series_id: 1,
            volume_number: Some(1),
            cover_url: cover_url.map(str::to_string),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_blank_cover_is_missing() {
        assert_eq!(volume(None).cover(), None);
        assert_eq!(volume(Some("   ")).cover(), None);
        assert_eq!(
            volume(Some("https://example.com/c.jpg")).cover(),
            Some("https://example.com/c.jpg")
        );
    }
}
