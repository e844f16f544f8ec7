use rusqlite::{Connection, Row, params};

use crate::error::Result;

/// A create record that lost a GUID collision during rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEntry {
    pub guid: String,
    pub origin: String,
    pub ts: i64,
    pub preview: String,
}

fn from_row(row: &Row) -> rusqlite::Result<CollisionEntry> {
    Ok(CollisionEntry {
        guid: row.get(0)?,
        origin: row.get(1)?,
        ts: row.get(2)?,
        preview: row.get(3)?,
    })
}

pub fn record(conn: &Connection, entry: &CollisionEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO collisions (guid, origin, ts, preview) VALUES (?1, ?2, ?3, ?4)",
        params![&entry.guid, &entry.origin, entry.ts, &entry.preview],
    )?;
    Ok(())
}

pub fn list(conn: &Connection) -> Result<Vec<CollisionEntry>> {
    let mut stmt =
        conn.prepare("SELECT guid, origin, ts, preview FROM collisions ORDER BY ts, guid")?;
    let entries = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM collisions", [], |row| row.get(0))?;
    Ok(count as usize)
}
