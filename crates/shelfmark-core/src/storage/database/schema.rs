use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 2;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS series (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            author      TEXT,
            publisher   TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS volume (
            isbn          TEXT PRIMARY KEY,
            series_id     INTEGER NOT NULL REFERENCES series(id) ON DELETE CASCADE,
            volume_number INTEGER,
            cover_url     TEXT,
            registered_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_series_title ON series(title);
        CREATE INDEX IF NOT EXISTS idx_series_author ON series(author);
        CREATE INDEX IF NOT EXISTS idx_volume_series_id ON volume(series_id);
        ",
    )?;
    Ok(())
}

/// One series per (title, author, publisher); missing author/publisher compare as empty.
pub fn create_series_identity_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE UNIQUE INDEX IF NOT EXISTS idx_series_identity
        ON series(title, COALESCE(author, ''), COALESCE(publisher, ''));
        ",
    )?;
    Ok(())
}
