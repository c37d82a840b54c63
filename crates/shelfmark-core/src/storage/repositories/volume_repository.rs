use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::warn;

use super::{Repository, decode_timestamp, encode_timestamp, is_unique_violation};
use crate::error::{Result, ShelfError};
use crate::identifiers::Isbn;
use crate::models::{DeletedVolume, NewVolume, SeriesId, Volume};

pub trait VolumeRepository: Repository<Entity = Volume, Id = Isbn> {
    /// Fails with `AlreadyExists` carrying the owning series when the ISBN is taken.
    fn insert(&self, series_id: SeriesId, volume: &NewVolume) -> Result<Volume>;
    fn remove(&self, isbn: &Isbn) -> Result<DeletedVolume>;
    fn list_by_series(&self, series_id: SeriesId) -> Result<Vec<Volume>>;
    fn count_by_series(&self, series_id: SeriesId) -> Result<usize>;
    fn owned_isbns(&self, isbns: &[Isbn]) -> Result<HashSet<Isbn>>;
}

pub struct SqliteVolumeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteVolumeRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const VOLUME_COLUMNS: &str = "isbn, series_id, volume_number, cover_url, registered_at";

// SQLite's default bound-parameter limit is 999.
const IN_CHUNK: usize = 500;

fn row_to_volume(row: &Row<'_>) -> rusqlite::Result<Volume> {
    let registered_at: String = row.get(4)?;
    Ok(Volume {
        isbn: row.get(0)?,
        series_id: row.get(1)?,
        volume_number: row.get(2)?,
        cover_url: row.get(3)?,
        registered_at: decode_timestamp(4, &registered_at)?,
    })
}

impl<'a> Repository for SqliteVolumeRepository<'a> {
    type Entity = Volume;
    type Id = Isbn;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let volume = self
            .conn
            .query_row(
                &format!("SELECT {VOLUME_COLUMNS} FROM volume WHERE isbn = ?1"),
                params![id],
                row_to_volume,
            )
            .optional()?;
        Ok(volume)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM volume WHERE isbn = ?1", params![id])?;
        Ok(affected > 0)
    }
}

impl<'a> VolumeRepository for SqliteVolumeRepository<'a> {
    fn insert(&self, series_id: SeriesId, volume: &NewVolume) -> Result<Volume> {
        let cover_url = volume
            .cover_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());
        let registered_at = Utc::now();

        let inserted = self.conn.execute(
            "INSERT INTO volume (isbn, series_id, volume_number, cover_url, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                volume.isbn,
                series_id,
                volume.volume_number,
                cover_url,
                encode_timestamp(&registered_at)
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                let existing = self.find_by_id(&volume.isbn)?.map(|v| v.series_id);
                warn!(
                    isbn = %volume.isbn,
                    series_id = ?existing,
                    reason = %e,
                    "volume insert hit a uniqueness constraint"
                );
                return Err(ShelfError::AlreadyExists {
                    isbn: volume.isbn.to_string(),
                    series_id: existing.unwrap_or(series_id),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.find_by_id(&volume.isbn)?
            .ok_or_else(|| ShelfError::VolumeNotFound(volume.isbn.to_string()))
    }

    fn remove(&self, isbn: &Isbn) -> Result<DeletedVolume> {
        let existing = self
            .find_by_id(isbn)?
            .ok_or_else(|| ShelfError::VolumeNotFound(isbn.to_string()))?;

        self.delete(isbn)?;
        let remaining_count = self.count_by_series(existing.series_id)?;

        Ok(DeletedVolume {
            isbn: existing.isbn,
            series_id: existing.series_id,
            remaining_count,
        })
    }

    fn list_by_series(&self, series_id: SeriesId) -> Result<Vec<Volume>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VOLUME_COLUMNS} FROM volume WHERE series_id = ?1"
        ))?;
        let rows = stmt.query_map(params![series_id], row_to_volume)?;

        let mut volumes = Vec::new();
        for row in rows {
            volumes.push(row?);
        }
        Ok(volumes)
    }

    fn count_by_series(&self, series_id: SeriesId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM volume WHERE series_id = ?1",
            params![series_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn owned_isbns(&self, isbns: &[Isbn]) -> Result<HashSet<Isbn>> {
        let mut owned = HashSet::new();
        for chunk in isbns.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT isbn FROM volume WHERE isbn IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, Isbn>(0))?;
            for row in rows {
                owned.insert(row?);
            }
        }
        Ok(owned)
    }
}
