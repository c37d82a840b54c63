use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Repository, decode_timestamp, encode_timestamp};
use crate::error::{Result, ShelfError};
use crate::identifiers::Isbn;
use crate::models::{DeletedSeries, NewSeries, Series, SeriesId};

pub trait SeriesRepository: Repository<Entity = Series, Id = SeriesId> {
    /// Reuse the series with identical metadata or create it. Atomic with
    /// respect to concurrent callers thanks to the identity index.
    fn find_or_create(&self, series: &NewSeries) -> Result<Series>;
    /// Newest first; `query` matches title or author as a substring.
    fn list(&self, query: Option<&str>) -> Result<Vec<Series>>;
    fn delete_with_volumes(&self, id: SeriesId) -> Result<DeletedSeries>;
}

pub struct SqliteSeriesRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSeriesRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const SERIES_COLUMNS: &str = "id, title, author, publisher, created_at";

fn row_to_series(row: &Row<'_>) -> rusqlite::Result<Series> {
    let created_at: String = row.get(4)?;
    Ok(Series {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        publisher: row.get(3)?,
        created_at: decode_timestamp(4, &created_at)?,
    })
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl<'a> Repository for SqliteSeriesRepository<'a> {
    type Entity = Series;
    type Id = SeriesId;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let series = self
            .conn
            .query_row(
                &format!("SELECT {SERIES_COLUMNS} FROM series WHERE id = ?1"),
                params![id],
                row_to_series,
            )
            .optional()?;
        Ok(series)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM series WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

impl<'a> SeriesRepository for SqliteSeriesRepository<'a> {
    fn find_or_create(&self, series: &NewSeries) -> Result<Series> {
        let title = series.title.trim();
        if title.is_empty() {
            return Err(ShelfError::Validation("series title is required".to_string()));
        }
        let author = clean(series.author.as_deref());
        let publisher = clean(series.publisher.as_deref());

        self.conn.execute(
            "INSERT INTO series (title, author, publisher, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT DO NOTHING",
            params![title, author, publisher, encode_timestamp(&Utc::now())],
        )?;

        let found = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SERIES_COLUMNS} FROM series
                     WHERE title = ?1
                       AND COALESCE(author, '') = COALESCE(?2, '')
                       AND COALESCE(publisher, '') = COALESCE(?3, '')
                     ORDER BY id ASC
                     LIMIT 1"
                ),
                params![title, author, publisher],
                row_to_series,
            )
            .optional()?;

        found.ok_or_else(|| {
            ShelfError::Validation(format!("series {title:?} could not be created"))
        })
    }

    fn list(&self, query: Option<&str>) -> Result<Vec<Series>> {
        let pattern = clean(query).map(|q| format!("%{q}%"));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SERIES_COLUMNS} FROM series
             WHERE ?1 IS NULL OR title LIKE ?1 OR author LIKE ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![pattern], row_to_series)?;

        let mut series = Vec::new();
        for row in rows {
            series.push(row?);
        }
        Ok(series)
    }

    fn delete_with_volumes(&self, id: SeriesId) -> Result<DeletedSeries> {
        if self.find_by_id(&id)?.is_none() {
            return Err(ShelfError::SeriesNotFound(id));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT isbn FROM volume WHERE series_id = ?1 ORDER BY isbn")?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, Isbn>(0))?;
        let mut isbns = Vec::new();
        for row in rows {
            isbns.push(row?);
        }

        self.conn
            .execute("DELETE FROM volume WHERE series_id = ?1", params![id])?;
        self.delete(&id)?;

        Ok(DeletedSeries {
            series_id: id,
            deleted_count: isbns.len(),
            isbns,
        })
    }
}
