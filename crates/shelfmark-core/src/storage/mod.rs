pub mod database;
pub mod library;
pub mod repositories;

use std::collections::HashSet;

use crate::error::Result;
use crate::identifiers::Isbn;
use crate::models::{
    DeletedSeries, DeletedVolume, NewSeries, NewVolume, RegisteredVolume, Series, SeriesId,
    Volume,
};

pub use library::Library;

/// Persistent store of owned series and volumes.
///
/// Ownership classification and cover selection read through this trait on
/// every call, so anything implementing it must reflect writes immediately.
pub trait LibraryStore: Send + Sync {
    fn find_volume(&self, isbn: &Isbn) -> Result<Option<Volume>>;

    /// Subset of `isbns` present in the store.
    fn owned_isbns(&self, isbns: &[Isbn]) -> Result<HashSet<Isbn>> {
        let mut owned = HashSet::new();
        for isbn in isbns {
            if self.find_volume(isbn)?.is_some() {
                owned.insert(isbn.clone());
            }
        }
        Ok(owned)
    }

    /// Reuse the series matching `series` (or create it) and add the volume.
    /// Fails with `AlreadyExists` when the ISBN is already stored.
    fn insert_volume(&self, series: &NewSeries, volume: &NewVolume) -> Result<RegisteredVolume>;

    /// Fails with `VolumeNotFound`.
    fn delete_volume(&self, isbn: &Isbn) -> Result<DeletedVolume>;

    /// Fails with `SeriesNotFound`.
    fn delete_series_with_volumes(&self, series_id: SeriesId) -> Result<DeletedSeries>;

    fn find_series(&self, series_id: SeriesId) -> Result<Option<Series>>;

    /// Unsorted; callers apply the display order.
    fn list_volumes_by_series(&self, series_id: SeriesId) -> Result<Vec<Volume>>;
}
