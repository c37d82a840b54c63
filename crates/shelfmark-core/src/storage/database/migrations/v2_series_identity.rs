use std::collections::HashMap;

use rusqlite::{Connection, params};
use tracing::warn;

use super::Migration;
use crate::error::Result;
use crate::storage::database::schema;

/// Folds series rows with identical metadata into the oldest one, then makes
/// the metadata unique so registration can reuse series atomically.
pub struct V2SeriesIdentity;

type IdentityKey = (String, String, String);

fn duplicate_pairs(conn: &Connection) -> Result<Vec<(i64, i64)>> {
    let mut stmt =
        conn.prepare("SELECT id, title, author, publisher FROM series ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        ))
    })?;

    let mut canonical: HashMap<IdentityKey, i64> = HashMap::new();
    let mut pairs = Vec::new();
    for row in rows {
        let (id, title, author, publisher) = row?;
        match canonical.get(&(title.clone(), author.clone(), publisher.clone())) {
            Some(&keep) => pairs.push((id, keep)),
            None => {
                canonical.insert((title, author, publisher), id);
            }
        }
    }
    Ok(pairs)
}

impl Migration for V2SeriesIdentity {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Merge duplicate series and add unique series identity index"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        let pairs = duplicate_pairs(conn)?;
        for (duplicate, keep) in &pairs {
            conn.execute(
                "UPDATE volume SET series_id = ?1 WHERE series_id = ?2",
                params![keep, duplicate],
            )?;
            conn.execute("DELETE FROM series WHERE id = ?1", params![duplicate])?;
        }
        if !pairs.is_empty() {
            warn!(merged_series = pairs.len(), "merged series with duplicate metadata");
        }

        schema::create_series_identity_index(conn)?;
        Ok(())
    }
}
