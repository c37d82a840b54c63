use std::cmp::Ordering;
use std::collections::HashMap;

use crate::identifiers::Isbn;
use crate::models::CatalogCandidate;

/// Which of two candidates for the same ISBN to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Existing,
    Incoming,
}

/// First applicable rule wins: a known volume number, then the smaller number,
/// then a known cover. Ties keep the candidate seen first.
pub fn prefer(existing: &CatalogCandidate, incoming: &CatalogCandidate) -> Preference {
    match (existing.volume_number, incoming.volume_number) {
        (None, Some(_)) => return Preference::Incoming,
        (Some(_), None) => return Preference::Existing,
        (Some(current), Some(new)) => match new.cmp(&current) {
            Ordering::Less => return Preference::Incoming,
            Ordering::Greater => return Preference::Existing,
            Ordering::Equal => {}
        },
        (None, None) => {}
    }

    if existing.cover_url.is_none() && incoming.cover_url.is_some() {
        return Preference::Incoming;
    }

    Preference::Existing
}

/// Collapse candidates sharing an ISBN into one, keeping the first-seen slot.
///
/// Candidates without an ISBN cannot be proven to be the same item, so each
/// one survives in place.
pub fn merge_candidates<I>(candidates: I) -> Vec<CatalogCandidate>
where
    I: IntoIterator<Item = CatalogCandidate>,
{
    let mut merged: Vec<CatalogCandidate> = Vec::new();
    let mut slots: HashMap<Isbn, usize> = HashMap::new();

    for candidate in candidates {
        let Some(isbn) = candidate.isbn.clone() else {
            merged.push(candidate);
            continue;
        };

        match slots.get(&isbn) {
            Some(&slot) => {
                if prefer(&merged[slot], &candidate) == Preference::Incoming {
                    merged[slot] = candidate;
                }
            }
            None => {
                slots.insert(isbn, merged.len());
                merged.push(candidate);
            }
        }
    }

    merged
}
