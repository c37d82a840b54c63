use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use super::LibraryStore;
use super::database::{self, ConnectionPool};
use super::repositories::{
    Repository, SeriesRepository, SqliteSeriesRepository, SqliteVolumeRepository,
    VolumeRepository,
};
use crate::config::AppConfig;
use crate::error::{Result, ShelfError};
use crate::identifiers::Isbn;
use crate::models::{
    DeletedSeries, DeletedVolume, NewSeries, NewVolume, RegisteredVolume, Series, SeriesDetail,
    SeriesId, SeriesSummary, Volume,
};
use crate::reconcile::{representative_cover, sort_volumes};

/// The owned collection, backed by SQLite.
pub struct Library {
    pool: ConnectionPool,
}

impl Library {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = database::open_database(path)?;
        info!(path = %path.display(), "opened library database");
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            pool: database::open_in_memory()?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::open(&config.database_path())
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    pub fn check_connection(&self) -> Result<()> {
        let conn = self.pool.get_connection();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    pub fn schema_versions(&self) -> Result<Vec<u32>> {
        let conn = self.pool.get_connection();
        database::get_applied_versions(&conn)
    }

    /// Every series with its volume count and representative cover, newest first.
    pub fn library_overview(&self, query: Option<&str>) -> Result<Vec<SeriesSummary>> {
        let conn = self.pool.get_connection();
        let series_repo = SqliteSeriesRepository::new(&conn);
        let volume_repo = SqliteVolumeRepository::new(&conn);

        let mut summaries = Vec::new();
        for series in series_repo.list(query)? {
            let volumes = volume_repo.list_by_series(series.id)?;
            summaries.push(SeriesSummary {
                volume_count: volumes.len(),
                representative_cover_url: representative_cover(&volumes).map(str::to_string),
                series,
            });
        }
        Ok(summaries)
    }

    pub fn series_detail(&self, series_id: SeriesId) -> Result<SeriesDetail> {
        let conn = self.pool.get_connection();
        let series = SqliteSeriesRepository::new(&conn)
            .find_by_id(&series_id)?
            .ok_or(ShelfError::SeriesNotFound(series_id))?;
        let mut volumes = SqliteVolumeRepository::new(&conn).list_by_series(series_id)?;
        sort_volumes(&mut volumes);
        Ok(SeriesDetail { series, volumes })
    }
}

impl LibraryStore for Library {
    fn find_volume(&self, isbn: &Isbn) -> Result<Option<Volume>> {
        let conn = self.pool.get_connection();
        SqliteVolumeRepository::new(&conn).find_by_id(isbn)
    }

    fn owned_isbns(&self, isbns: &[Isbn]) -> Result<HashSet<Isbn>> {
        let conn = self.pool.get_connection();
        SqliteVolumeRepository::new(&conn).owned_isbns(isbns)
    }

    fn insert_volume(&self, series: &NewSeries, volume: &NewVolume) -> Result<RegisteredVolume> {
        let mut conn = self.pool.get_connection();
        let tx = conn.transaction()?;

        let registered = {
            let volume_repo = SqliteVolumeRepository::new(&tx);
            if let Some(existing) = volume_repo.find_by_id(&volume.isbn)? {
                return Err(ShelfError::AlreadyExists {
                    isbn: volume.isbn.to_string(),
                    series_id: existing.series_id,
                });
            }

            let series = SqliteSeriesRepository::new(&tx).find_or_create(series)?;
            let volume = volume_repo.insert(series.id, volume)?;
            RegisteredVolume { series, volume }
        };

        tx.commit()?;
        debug!(
            isbn = %registered.volume.isbn,
            series_id = registered.series.id,
            "volume registered"
        );
        Ok(registered)
    }

    fn delete_volume(&self, isbn: &Isbn) -> Result<DeletedVolume> {
        let mut conn = self.pool.get_connection();
        let tx = conn.transaction()?;

        let deleted = SqliteVolumeRepository::new(&tx).remove(isbn)?;
        if deleted.remaining_count == 0 {
            SqliteSeriesRepository::new(&tx).delete(&deleted.series_id)?;
            debug!(series_id = deleted.series_id, "removed series left without volumes");
        }

        tx.commit()?;
        Ok(deleted)
    }

    fn delete_series_with_volumes(&self, series_id: SeriesId) -> Result<DeletedSeries> {
        let mut conn = self.pool.get_connection();
        let tx = conn.transaction()?;
        let deleted = SqliteSeriesRepository::new(&tx).delete_with_volumes(series_id)?;
        tx.commit()?;
        Ok(deleted)
    }

    fn find_series(&self, series_id: SeriesId) -> Result<Option<Series>> {
        let conn = self.pool.get_connection();
        SqliteSeriesRepository::new(&conn).find_by_id(&series_id)
    }

    fn list_volumes_by_series(&self, series_id: SeriesId) -> Result<Vec<Volume>> {
        let conn = self.pool.get_connection();
        SqliteVolumeRepository::new(&conn).list_by_series(series_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn isbn(raw: &str) -> Isbn {
        Isbn::parse(raw).unwrap()
    }

    fn new_volume(raw: &str, number: Option<u32>, cover: Option<&str>) -> NewVolume {
        NewVolume {
            isbn: isbn(raw),
            volume_number: number,
            cover_url: cover.map(str::to_string),
        }
    }

    fn series() -> NewSeries {
        NewSeries::new("テスト作品")
            .with_author("テスト著者")
            .with_publisher("テスト出版社")
    }

    #[test]
    fn test_same_metadata_shares_series() {
        let library = Library::open_in_memory().unwrap();
        let first = library
            .insert_volume(&series(), &new_volume("9784000000002", Some(1), None))
            .unwrap();
        let second = library
            .insert_volume(&series(), &new_volume("9784000000005", Some(2), None))
            .unwrap();
        assert_eq!(first.series.id, second.series.id);
    }

    #[test]
    fn test_duplicate_isbn_reports_owning_series() {
        let library = Library::open_in_memory().unwrap();
        let first = library
            .insert_volume(&series(), &new_volume("9784000000002", Some(1), None))
            .unwrap();

        let err = library
            .insert_volume(&NewSeries::new("別作品"), &new_volume("9784000000002", None, None))
            .unwrap_err();
        assert!(matches!(
            err,
            ShelfError::AlreadyExists { series_id, .. } if series_id == first.series.id
        ));
        // the failed attempt must not leave a stray series behind
        assert_eq!(library.library_overview(None).unwrap().len(), 1);
    }

    #[test]
    fn test_overview_uses_representative_cover() {
        let library = Library::open_in_memory().unwrap();
        library
            .insert_volume(&series(), &new_volume("9784000000002", Some(2), Some("v2")))
            .unwrap();
        library
            .insert_volume(&series(), &new_volume("9784000000005", Some(1), Some("v1")))
            .unwrap();
        library
            .insert_volume(&NewSeries::new("表紙なし"), &new_volume("9784000000009", None, None))
            .unwrap();

        let overview = library.library_overview(None).unwrap();
        assert_eq!(overview.len(), 2);
        let covered = overview.iter().find(|s| s.series.title == "テスト作品").unwrap();
        assert_eq!(covered.volume_count, 2);
        assert_eq!(covered.representative_cover_url.as_deref(), Some("v1"));
        let bare = overview.iter().find(|s| s.series.title == "表紙なし").unwrap();
        assert_eq!(bare.representative_cover_url, None);

        let filtered = library.library_overview(Some("表紙")).unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_series_detail_is_sorted() {
        let library = Library::open_in_memory().unwrap();
        let registered = library
            .insert_volume(&series(), &new_volume("9784000000009", None, None))
            .unwrap();
        library
            .insert_volume(&series(), &new_volume("9784000000005", Some(2), None))
            .unwrap();
        library
            .insert_volume(&series(), &new_volume("9784000000002", Some(1), None))
            .unwrap();

        let detail = library.series_detail(registered.series.id).unwrap();
        let order: Vec<_> = detail.volumes.iter().map(|v| v.isbn.as_str()).collect();
        assert_eq!(order, vec!["9784000000002", "9784000000005", "9784000000009"]);

        assert!(matches!(
            library.series_detail(999),
            Err(ShelfError::SeriesNotFound(999))
        ));
    }

    #[test]
    fn test_deleting_last_volume_removes_series() {
        let library = Library::open_in_memory().unwrap();
        let registered = library
            .insert_volume(&series(), &new_volume("9784000000002", Some(1), None))
            .unwrap();
        library
            .insert_volume(&series(), &new_volume("9784000000005", Some(2), None))
            .unwrap();

        let deleted = library.delete_volume(&isbn("9784000000002")).unwrap();
        assert_eq!(deleted.remaining_count, 1);
        assert!(library.find_series(registered.series.id).unwrap().is_some());

        let deleted = library.delete_volume(&isbn("9784000000005")).unwrap();
        assert_eq!(deleted.remaining_count, 0);
        assert!(library.find_series(registered.series.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_series_cascades() {
        let library = Library::open_in_memory().unwrap();
        let registered = library
            .insert_volume(&series(), &new_volume("9784000000002", Some(1), None))
            .unwrap();
        library
            .insert_volume(&series(), &new_volume("9784000000005", Some(2), None))
            .unwrap();

        let deleted = library
            .delete_series_with_volumes(registered.series.id)
            .unwrap();
        assert_eq!(deleted.deleted_count, 2);
        assert!(library.find_volume(&isbn("9784000000002")).unwrap().is_none());
        assert!(matches!(
            library.delete_series_with_volumes(registered.series.id),
            Err(ShelfError::SeriesNotFound(_))
        ));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("library.db");
        {
            let library = Library::open(&path).unwrap();
            library
                .insert_volume(&series(), &new_volume("9784000000002", Some(1), None))
                .unwrap();
        }

        let reopened = Library::open(&path).unwrap();
        reopened.check_connection().unwrap();
        assert!(reopened.find_volume(&isbn("9784000000002")).unwrap().is_some());
        assert_eq!(reopened.schema_versions().unwrap(), vec![1, 2]);
    }
}
