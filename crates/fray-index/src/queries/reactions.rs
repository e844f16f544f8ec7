use fray_types::Reaction;
use rusqlite::{Connection, Row, params};

use crate::error::Result;

fn from_row(row: &Row) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        message_guid: row.get(0)?,
        from_agent: row.get(1)?,
        reaction: row.get(2)?,
        reacted_at: row.get(3)?,
    })
}

/// Idempotent add: re-adding the same (message, agent, emoji) leaves one row.
pub fn upsert(conn: &Connection, reaction: &Reaction) -> Result<bool> {
    let changed = conn.execute(
        r#"
        INSERT OR IGNORE INTO reactions (message_guid, agent_id, emoji, ts)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![
            &reaction.message_guid,
            &reaction.from_agent,
            &reaction.reaction,
            reaction.reacted_at
        ],
    )?;
    Ok(changed > 0)
}

pub fn list_for_message(conn: &Connection, message_guid: &str) -> Result<Vec<Reaction>> {
    let mut stmt = conn.prepare(
        "SELECT message_guid, agent_id, emoji, ts FROM reactions
         WHERE message_guid = ?1 ORDER BY ts, agent_id",
    )?;
    let reactions = stmt
        .query_map([message_guid], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(reactions)
}
