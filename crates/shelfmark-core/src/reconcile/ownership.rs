use std::collections::HashSet;

use crate::error::Result;
use crate::identifiers::Isbn;
use crate::models::{CatalogCandidate, ClassifiedCandidate, Ownership};
use crate::storage::LibraryStore;

pub fn resolve_ownership(isbn: Option<&Isbn>, owned: &HashSet<Isbn>) -> Ownership {
    match isbn {
        None => Ownership::Unknown,
        Some(isbn) if owned.contains(isbn) => Ownership::Owned,
        Some(_) => Ownership::NotOwned,
    }
}

/// Ownership of one candidate against the store as it is right now.
pub fn classify<S>(candidate: &CatalogCandidate, store: &S) -> Result<Ownership>
where
    S: LibraryStore + ?Sized,
{
    let Some(isbn) = candidate.isbn.as_ref() else {
        return Ok(Ownership::Unknown);
    };
    Ok(if store.find_volume(isbn)?.is_some() {
        Ownership::Owned
    } else {
        Ownership::NotOwned
    })
}

/// Classify a whole result list with a single store round trip.
pub fn classify_all<S>(
    candidates: Vec<CatalogCandidate>,
    store: &S,
) -> Result<Vec<ClassifiedCandidate>>
where
    S: LibraryStore + ?Sized,
{
    let mut isbns: Vec<Isbn> = candidates.iter().filter_map(|c| c.isbn.clone()).collect();
    isbns.sort();
    isbns.dedup();
    let owned = store.owned_isbns(&isbns)?;

    Ok(candidates
        .into_iter()
        .map(|candidate| ClassifiedCandidate {
            ownership: resolve_ownership(candidate.isbn.as_ref(), &owned),
            candidate,
        })
        .collect())
}

/// Reclassify a displayed list after a registration or conflict, without a reload.
/// Returns how many entries changed.
pub fn mark_owned(candidates: &mut [ClassifiedCandidate], isbn: &Isbn) -> usize {
    set_ownership(candidates, isbn, Ownership::Owned)
}

pub fn mark_not_owned(candidates: &mut [ClassifiedCandidate], isbn: &Isbn) -> usize {
    set_ownership(candidates, isbn, Ownership::NotOwned)
}

fn set_ownership(
    candidates: &mut [ClassifiedCandidate],
    isbn: &Isbn,
    ownership: Ownership,
) -> usize {
    let mut changed = 0;
    for entry in candidates
        .iter_mut()
        .filter(|entry| entry.candidate.isbn.as_ref() == Some(isbn))
    {
        if entry.ownership != ownership {
            entry.ownership = ownership;
            changed += 1;
        }
    }
    changed
}
