use serde::{Deserialize, Serialize};

use crate::identifiers::Isbn;

/// A catalog search or lookup result. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCandidate {
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    /// Without an ISBN the candidate cannot be matched, registered or deduplicated.
    pub isbn: Option<Isbn>,
    pub volume_number: Option<u32>,
    pub cover_url: Option<String>,
}

impl CatalogCandidate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            publisher: None,
            isbn: None,
            volume_number: None,
            cover_url: None,
        }
    }

    pub fn with_isbn(mut self, isbn: Isbn) -> Self {
        self.isbn = Some(isbn);
        self
    }

    pub fn with_volume_number(mut self, number: u32) -> Self {
        self.volume_number = Some(number);
        self
    }

    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    /// Text checked by the edition filter.
    pub fn descriptive_text(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str())
            .chain(self.author.as_deref())
            .chain(self.publisher.as_deref())
    }
}

/// Three-valued ownership. `Unknown` is used only when the candidate has no ISBN,
/// so it must never be read as "not owned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ownership {
    Owned,
    NotOwned,
    Unknown,
}

impl Ownership {
    /// Only candidates known not to be owned may be offered for registration.
    pub fn is_registrable(self) -> bool {
        self == Ownership::NotOwned
    }
}

/// A candidate paired with the ownership observed at classification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedCandidate {
    #[serde(flatten)]
    pub candidate: CatalogCandidate,
    pub ownership: Ownership,
}
