//! Turning catalog results and scanned text into classified, ordered candidates.

pub mod exclusion;
pub mod merge;
pub mod ordering;
pub mod ownership;
pub mod representative;
pub mod series_candidates;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

pub use exclusion::EditionFilter;
pub use merge::{Preference, merge_candidates, prefer};
pub use ordering::{
    candidate_order, merge_volume, sort_candidates, sort_classified, sort_volumes, volume_order,
};
pub use ownership::{classify, classify_all, mark_not_owned, mark_owned, resolve_ownership};
pub use representative::representative_cover;
pub use series_candidates::{
    SeriesMatcher, build_series_query, missing_volumes, normalize_for_match,
};

use crate::config::{AppConfig, MAX_SEARCH_LIMIT};
use crate::error::{Result, ShelfError};
use crate::identifiers::{Isbn, extract_isbn_from_text};
use crate::models::{CatalogCandidate, ClassifiedCandidate, SeriesId};
use crate::storage::LibraryStore;

/// A bibliographic catalog that can be searched by keyword or ISBN.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Human readable name used in errors and logs.
    fn name(&self) -> &str;

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<CatalogCandidate>>;

    /// Best match for `isbn`: the exact item if the catalog returns it,
    /// otherwise its first result.
    async fn lookup(&self, isbn: &Isbn) -> Result<Option<CatalogCandidate>>;

    /// Metadata for registering `isbn`. Only an item carrying exactly this
    /// ISBN is accepted.
    async fn volume_metadata(&self, isbn: &Isbn) -> Result<CatalogCandidate> {
        match self.lookup(isbn).await? {
            Some(candidate) if candidate.isbn.as_ref() == Some(isbn) => Ok(candidate),
            _ => Err(ShelfError::CatalogItemNotFound(isbn.to_string())),
        }
    }
}

/// Runs catalog results through exclusion, merging, classification and ordering.
pub struct Reconciler {
    catalog: Arc<dyn CatalogProvider>,
    store: Arc<dyn LibraryStore>,
    filter: EditionFilter,
    search_limit: usize,
    series_candidates_limit: usize,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        store: Arc<dyn LibraryStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            filter: EditionFilter::from_config(&config.reconcile),
            search_limit: config.catalog.search_limit,
            series_candidates_limit: config.catalog.series_candidates_limit,
        }
    }

    /// Keyword search. `limit` falls back to the configured page size.
    pub async fn search(
        &self,
        keyword: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ClassifiedCandidate>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ShelfError::Validation("search keyword must not be empty".to_string()));
        }
        let limit = limit.unwrap_or(self.search_limit);
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(ShelfError::Validation(format!(
                "search limit must be within 1..={MAX_SEARCH_LIMIT}, got {limit}"
            )));
        }

        let found = self.catalog.search(keyword, limit).await?;
        let total = found.len();
        let kept = self.filter.retain(found);
        let merged = merge_candidates(kept);
        debug!(
            keyword,
            total,
            kept = merged.len(),
            catalog = self.catalog.name(),
            "reconciled search results"
        );

        let mut classified = classify_all(merged, self.store.as_ref())?;
        sort_classified(&mut classified);
        Ok(classified)
    }

    /// Look up one identifier typed by the user.
    pub async fn lookup(&self, raw: &str) -> Result<ClassifiedCandidate> {
        let isbn = Isbn::parse(raw)?;
        self.lookup_isbn(&isbn).await
    }

    /// Look up whatever identifier can be pulled out of scanner or OCR text.
    pub async fn scan(&self, text: &str) -> Result<ClassifiedCandidate> {
        let isbn = extract_isbn_from_text(text)?;
        debug!(isbn = %isbn, "extracted identifier from scan");
        self.lookup_isbn(&isbn).await
    }

    async fn lookup_isbn(&self, isbn: &Isbn) -> Result<ClassifiedCandidate> {
        let candidate = self
            .catalog
            .lookup(isbn)
            .await?
            .ok_or_else(|| ShelfError::CatalogItemNotFound(isbn.to_string()))?;
        let ownership = classify(&candidate, self.store.as_ref())?;
        Ok(ClassifiedCandidate {
            candidate,
            ownership,
        })
    }

    /// Catalog volumes of an owned series that are missing from the library.
    pub async fn missing_volumes(&self, series_id: SeriesId) -> Result<Vec<CatalogCandidate>> {
        let series = self
            .store
            .find_series(series_id)?
            .ok_or(ShelfError::SeriesNotFound(series_id))?;
        let owned_volumes = self.store.list_volumes_by_series(series_id)?;

        let query = build_series_query(&series);
        let found = self
            .catalog
            .search(&query, self.series_candidates_limit)
            .await?;

        let isbns: Vec<Isbn> = found.iter().filter_map(|c| c.isbn.clone()).collect();
        let owned_isbns = self.store.owned_isbns(&isbns)?;
        let matcher = SeriesMatcher::new(&series, self.filter.terms());
        Ok(missing_volumes(&matcher, &owned_volumes, &owned_isbns, found))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Canned catalog that records the keywords it was asked for.
    #[derive(Default)]
    pub struct FakeCatalog {
        pub items: Vec<CatalogCandidate>,
        pub failure: Option<fn() -> ShelfError>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        pub fn with_items(items: Vec<CatalogCandidate>) -> Self {
            Self {
                items,
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CatalogProvider for FakeCatalog {
        fn name(&self) -> &str {
            "fake catalog"
        }

        async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<CatalogCandidate>> {
            self.calls.lock().unwrap().push(keyword.to_string());
            if let Some(failure) = self.failure {
                return Err(failure());
            }
            Ok(self.items.iter().take(limit).cloned().collect())
        }

        async fn lookup(&self, isbn: &Isbn) -> Result<Option<CatalogCandidate>> {
            self.calls.lock().unwrap().push(isbn.to_string());
            if let Some(failure) = self.failure {
                return Err(failure());
            }
            let exact = self
                .items
                .iter()
                .find(|item| item.isbn.as_ref() == Some(isbn));
            Ok(exact.or(self.items.first()).cloned())
        }
    }
}
