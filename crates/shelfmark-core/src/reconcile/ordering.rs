use std::cmp::Ordering;

use crate::models::{CatalogCandidate, ClassifiedCandidate, Volume};

/// Ascending with unknown numbers last.
fn numbers_nulls_last(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Volume number (nulls last), then registration time, then ISBN. ISBNs are
/// unique, so no two volumes compare equal.
pub fn volume_order(a: &Volume, b: &Volume) -> Ordering {
    numbers_nulls_last(a.volume_number, b.volume_number)
        .then_with(|| a.registered_at.cmp(&b.registered_at))
        .then_with(|| a.isbn.cmp(&b.isbn))
}

/// Volume number (nulls last), then ISBN (missing last).
pub fn candidate_order(a: &CatalogCandidate, b: &CatalogCandidate) -> Ordering {
    numbers_nulls_last(a.volume_number, b.volume_number).then_with(|| {
        match (&a.isbn, &b.isbn) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    })
}

pub fn sort_volumes(volumes: &mut [Volume]) {
    volumes.sort_by(volume_order);
}

// Stable sorts: ISBN-less candidates with equal numbers keep their relative order.
pub fn sort_candidates(candidates: &mut [CatalogCandidate]) {
    candidates.sort_by(candidate_order);
}

pub fn sort_classified(candidates: &mut [ClassifiedCandidate]) {
    candidates.sort_by(|a, b| candidate_order(&a.candidate, &b.candidate));
}

/// Insert or replace `volume` in an already displayed list, keeping display order.
pub fn merge_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    match volumes.iter_mut().find(|existing| existing.isbn == volume.isbn) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
    sort_volumes(volumes);
}
