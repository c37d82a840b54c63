//! NDL Search (National Diet Library) OpenSearch client.

mod parser;
mod title;

use async_trait::async_trait;
use shelfmark_core::config::CatalogConfig;
use shelfmark_core::models::CatalogCandidate;
use shelfmark_core::{CatalogProvider, Isbn};
use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::http::{RequestPolicy, RetryingClient};

pub use parser::parse_opensearch_rss;
pub use title::{split_title, volume_number};

pub const NDL_UPSTREAM: &str = "NDL Search";

// Enough to find the exact edition among reprints sharing one record.
const LOOKUP_COUNT: usize = 10;

pub struct NdlClient {
    http: RetryingClient,
    base_url: String,
}

impl NdlClient {
    pub fn new(base_url: impl Into<String>, policy: RequestPolicy) -> Result<Self> {
        Ok(Self {
            http: RetryingClient::new(NDL_UPSTREAM, policy)?,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), RequestPolicy::from_config(config))
    }

    async fn fetch(&self, query: &[(&str, String)]) -> Result<Vec<CatalogCandidate>> {
        let body = self.http.get_text(&self.base_url, query).await?;
        let items = parse_opensearch_rss(&body)?;
        debug!(upstream = NDL_UPSTREAM, count = items.len(), "parsed catalog items");
        Ok(items)
    }

    /// Free-text search, one page of `limit` results. Pages start at 1.
    pub async fn search_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
        page: usize,
    ) -> Result<Vec<CatalogCandidate>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(CatalogError::InvalidQuery("keyword must not be blank".into()));
        }
        if limit == 0 {
            return Err(CatalogError::InvalidQuery("limit must be at least 1".into()));
        }
        if page == 0 {
            return Err(CatalogError::InvalidQuery("page must be at least 1".into()));
        }

        let start = (page - 1) * limit + 1;
        self.fetch(&[
            ("any", keyword.to_string()),
            ("cnt", limit.to_string()),
            ("idx", start.to_string()),
        ])
        .await
    }

    /// Look up by ISBN. Prefers the item carrying exactly that ISBN and falls
    /// back to the first item returned.
    pub async fn lookup_by_identifier(&self, raw: &str) -> Result<Option<CatalogCandidate>> {
        let isbn = Isbn::parse(raw).map_err(|_| CatalogError::InvalidIsbn(raw.to_string()))?;
        let items = self
            .fetch(&[("isbn", isbn.to_string()), ("cnt", LOOKUP_COUNT.to_string())])
            .await?;
        Ok(pick_exact_or_first(items, &isbn))
    }

    /// Metadata for registering `isbn`. Only an item with exactly that ISBN counts.
    pub async fn fetch_volume_metadata(&self, isbn: &Isbn) -> Result<CatalogCandidate> {
        let items = self
            .fetch(&[("isbn", isbn.to_string()), ("cnt", "1".to_string())])
            .await?;
        items
            .into_iter()
            .find(|item| item.isbn.as_ref() == Some(isbn))
            .ok_or_else(|| CatalogError::ItemNotFound(isbn.to_string()))
    }
}

fn pick_exact_or_first(mut items: Vec<CatalogCandidate>, isbn: &Isbn) -> Option<CatalogCandidate> {
    match items.iter().position(|item| item.isbn.as_ref() == Some(isbn)) {
        Some(index) => Some(items.swap_remove(index)),
        None => items.into_iter().next(),
    }
}

#[async_trait]
impl CatalogProvider for NdlClient {
    fn name(&self) -> &str {
        NDL_UPSTREAM
    }

    async fn search(
        &self,
        keyword: &str,
        limit: usize,
    ) -> shelfmark_core::Result<Vec<CatalogCandidate>> {
        self.search_by_keyword(keyword, limit, 1)
            .await
            .map_err(Into::into)
    }

    async fn lookup(&self, isbn: &Isbn) -> shelfmark_core::Result<Option<CatalogCandidate>> {
        self.lookup_by_identifier(isbn.as_str())
            .await
            .map_err(Into::into)
    }

    async fn volume_metadata(&self, isbn: &Isbn) -> shelfmark_core::Result<CatalogCandidate> {
        self.fetch_volume_metadata(isbn).await.map_err(Into::into)
    }
}
