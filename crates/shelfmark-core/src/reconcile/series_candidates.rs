//! Catalog volumes of an owned series that are not in the library yet.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

use crate::identifiers::Isbn;
use crate::models::{CatalogCandidate, Series, Volume};
use crate::reconcile::merge::merge_candidates;
use crate::reconcile::ordering::sort_candidates;

/// Comparable form of free text: NFKC, trimmed, lowercased, whitespace removed.
/// Blank input gives `None`.
pub fn normalize_for_match(raw: Option<&str>) -> Option<String> {
    let widened: String = raw?.nfkc().collect();
    let compact: String = widened
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    (!compact.is_empty()).then_some(compact)
}

fn contains_either_way(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Keyword sent to the catalog when looking for the rest of a series.
pub fn build_series_query(series: &Series) -> String {
    let mut parts = vec![series.title.trim()];
    for extra in [series.author.as_deref(), series.publisher.as_deref()] {
        if let Some(value) = extra
            && normalize_for_match(Some(value)).is_some()
        {
            parts.push(value.trim());
        }
    }
    parts.join(" ")
}

/// Decides whether a catalog candidate belongs to a given series.
pub struct SeriesMatcher {
    title: Option<String>,
    author: Option<String>,
    publisher: Option<String>,
    exclusion_terms: Vec<String>,
}

impl SeriesMatcher {
    pub fn new<'t>(series: &Series, exclusion_terms: impl IntoIterator<Item = &'t String>) -> Self {
        let mut terms: Vec<String> = Vec::new();
        for term in exclusion_terms {
            if let Some(term) = normalize_for_match(Some(term))
                && !terms.contains(&term)
            {
                terms.push(term);
            }
        }

        Self {
            title: normalize_for_match(Some(&series.title)),
            author: normalize_for_match(series.author.as_deref()),
            publisher: normalize_for_match(series.publisher.as_deref()),
            exclusion_terms: terms,
        }
    }

    pub fn title_matches(&self, candidate: &CatalogCandidate) -> bool {
        match (&self.title, normalize_for_match(Some(&candidate.title))) {
            (Some(series), Some(candidate)) => contains_either_way(series, &candidate),
            _ => false,
        }
    }

    /// A side with no value is compatible with anything.
    fn metadata_matches(expected: Option<&str>, candidate: Option<&str>) -> bool {
        match (expected, normalize_for_match(candidate)) {
            (Some(expected), Some(candidate)) => contains_either_way(expected, &candidate),
            _ => true,
        }
    }

    pub fn author_matches(&self, candidate: &CatalogCandidate) -> bool {
        Self::metadata_matches(self.author.as_deref(), candidate.author.as_deref())
    }

    pub fn publisher_matches(&self, candidate: &CatalogCandidate) -> bool {
        Self::metadata_matches(self.publisher.as_deref(), candidate.publisher.as_deref())
    }

    /// Edition exclusion on normalized text, so full-width or lowercase
    /// variants of a term are caught as well.
    pub fn is_excluded(&self, candidate: &CatalogCandidate) -> bool {
        if self.exclusion_terms.is_empty() {
            return false;
        }
        let text = candidate
            .descriptive_text()
            .filter_map(|part| normalize_for_match(Some(part)))
            .collect::<Vec<_>>()
            .join(" ");
        self.exclusion_terms.iter().any(|term| text.contains(term.as_str()))
    }

    pub fn matches(&self, candidate: &CatalogCandidate) -> bool {
        self.title_matches(candidate)
            && self.author_matches(candidate)
            && self.publisher_matches(candidate)
            && !self.is_excluded(candidate)
    }
}

/// Candidates for volumes of `series` the library does not hold.
///
/// `owned_isbns` holds every catalog ISBN already in the store; the series'
/// own volumes are added to it here. Candidates whose volume number is
/// already owned are skipped too, since another printing of an owned volume
/// is not a missing volume.
pub fn missing_volumes(
    matcher: &SeriesMatcher,
    owned_volumes: &[Volume],
    owned_isbns: &HashSet<Isbn>,
    candidates: Vec<CatalogCandidate>,
) -> Vec<CatalogCandidate> {
    let series_isbns: HashSet<&Isbn> = owned_volumes.iter().map(|v| &v.isbn).collect();
    let owned_numbers: HashSet<u32> =
        owned_volumes.iter().filter_map(|v| v.volume_number).collect();

    let kept = candidates.into_iter().filter(|candidate| {
        let Some(isbn) = candidate.isbn.as_ref() else {
            return false;
        };
        if owned_isbns.contains(isbn) || series_isbns.contains(isbn) {
            return false;
        }
        if candidate
            .volume_number
            .is_some_and(|number| owned_numbers.contains(&number))
        {
            return false;
        }
        matcher.matches(candidate)
    });

    let mut merged = merge_candidates(kept);
    sort_candidates(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileConfig;
    use chrono::Utc;

    fn isbn(raw: &str) -> Isbn {
        Isbn::parse(raw).unwrap()
    }

    fn series() -> Series {
        Series {
            id: 1,
            title: "テスト作品".to_string(),
            author: Some("テスト 著者".to_string()),
            publisher: Some("テスト出版社".to_string()),
            created_at: Utc::now(),
        }
    }

    fn matcher() -> SeriesMatcher {
        SeriesMatcher::new(&series(), &ReconcileConfig::default().exclusion_terms)
    }

    fn owned(raw: &str, number: Option<u32>) -> Volume {
        Volume {
            isbn: isbn(raw),
            series_id: 1,
            volume_number: number,
            cover_url: None,
            registered_at: Utc::now(),
        }
    }

    fn candidate(raw: &str, number: Option<u32>) -> CatalogCandidate {
        let candidate = CatalogCandidate::new("テスト作品")
            .with_author("テスト著者")
            .with_publisher("テスト出版社")
            .with_isbn(isbn(raw));
        match number {
            Some(n) => candidate.with_volume_number(n),
            None => candidate,
        }
    }

    #[test]
    fn normalization_folds_width_case_and_spaces() {
        assert_eq!(
            normalize_for_match(Some(" ＡＢＣ　ｄｅｆ ")),
            Some("abcdef".to_string())
        );
        assert_eq!(normalize_for_match(Some("   ")), None);
        assert_eq!(normalize_for_match(None), None);
    }

    #[test]
    fn query_joins_present_metadata() {
        assert_eq!(build_series_query(&series()), "テスト作品 テスト 著者 テスト出版社");
        let mut bare = series();
        bare.author = Some("  ".to_string());
        bare.publisher = None;
        assert_eq!(build_series_query(&bare), "テスト作品");
    }

    #[test]
    fn only_unowned_matching_volumes_survive() {
        let owned_volumes = vec![owned("9784000000001", Some(1))];
        let store_owned = HashSet::from([isbn("9784000000009")]);

        let result = missing_volumes(
            &matcher(),
            &owned_volumes,
            &store_owned,
            vec![
                candidate("9784000000001", Some(1)),
                candidate("9784000000011", Some(1)),
                candidate("9784000000009", Some(9)),
                candidate("9784000000003", Some(3)),
                candidate("9784000000002", Some(2)),
                CatalogCandidate::new("テスト作品").with_volume_number(4),
                candidate("9784000000004", Some(4)).with_publisher("別出版社"),
                {
                    let mut c = candidate("9784000000005", Some(5));
                    c.title = "無関係な本".to_string();
                    c
                },
                {
                    let mut c = candidate("9784000000006", Some(6));
                    c.title = "テスト作品 ｋｉｎｄｌｅ".to_string();
                    c
                },
                candidate("9784000000007", None),
            ],
        );

        let isbns: Vec<_> = result
            .iter()
            .map(|c| c.isbn.as_ref().unwrap().as_str())
            .collect();
        assert_eq!(isbns, vec!["9784000000002", "9784000000003", "9784000000007"]);
    }

    #[test]
    fn duplicates_are_merged_before_sorting() {
        let result = missing_volumes(
            &matcher(),
            &[],
            &HashSet::new(),
            vec![
                candidate("9784000000002", None),
                candidate("9784000000002", Some(2)).with_cover_url("https://example.com/2.jpg"),
            ],
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].volume_number, Some(2));
    }

    #[test]
    fn missing_metadata_is_compatible() {
        let matcher = matcher();
        let mut c = candidate("9784000000002", Some(2));
        c.author = None;
        c.publisher = None;
        assert!(matcher.matches(&c));

        let mut shorter = c.clone();
        shorter.title = "テスト".to_string();
        assert!(matcher.title_matches(&shorter));
    }
}
