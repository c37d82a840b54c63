use crate::config::ReconcileConfig;
use crate::models::CatalogCandidate;

/// Drops special, limited and electronic editions before deduplication so they
/// never win a merge against the regular print edition.
#[derive(Debug, Clone, Default)]
pub struct EditionFilter {
    terms: Vec<String>,
}

impl EditionFilter {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kept: Vec<String> = Vec::new();
        for term in terms.into_iter().map(Into::into) {
            // an empty term would match every candidate
            if term.trim().is_empty() || kept.contains(&term) {
                continue;
            }
            kept.push(term);
        }
        Self { terms: kept }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(config.exclusion_terms.iter().cloned())
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Case-sensitive substring match against title, author and publisher.
    pub fn is_excluded(&self, candidate: &CatalogCandidate) -> bool {
        candidate
            .descriptive_text()
            .any(|text| self.terms.iter().any(|term| text.contains(term.as_str())))
    }

    pub fn retain(&self, candidates: Vec<CatalogCandidate>) -> Vec<CatalogCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| !self.is_excluded(candidate))
            .collect()
    }
}
