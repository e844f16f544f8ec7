use fray_types::{GhostCursor, ReadTo};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;

fn read_to_from_row(row: &Row) -> rusqlite::Result<ReadTo> {
    Ok(ReadTo {
        agent_id: row.get(0)?,
        home: row.get(1)?,
        message_guid: row.get(2)?,
        ts: row.get(3)?,
        set_at: row.get(4)?,
    })
}

fn ghost_from_row(row: &Row) -> rusqlite::Result<GhostCursor> {
    Ok(GhostCursor {
        agent_id: row.get(0)?,
        home: row.get(1)?,
        message_guid: row.get(2)?,
        assigned_at: row.get(3)?,
        session_ack: row.get(4)?,
    })
}

pub fn upsert_read_to(conn: &Connection, row: &ReadTo) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO read_to (agent_id, home, message_guid, ts, set_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(agent_id, home) DO UPDATE SET
            message_guid = ?3,
            ts = ?4,
            set_at = ?5
        "#,
        params![&row.agent_id, &row.home, &row.message_guid, row.ts, row.set_at],
    )?;
    Ok(())
}

pub fn get_read_to(conn: &Connection, agent_id: &str, home: &str) -> Result<Option<ReadTo>> {
    let result = conn
        .query_row(
            "SELECT agent_id, home, message_guid, ts, set_at FROM read_to
             WHERE agent_id = ?1 AND home = ?2",
            params![agent_id, home],
            read_to_from_row,
        )
        .optional()?;
    Ok(result)
}

pub fn list_read_to(conn: &Connection) -> Result<Vec<ReadTo>> {
    let mut stmt = conn.prepare(
        "SELECT agent_id, home, message_guid, ts, set_at FROM read_to ORDER BY agent_id, home",
    )?;
    let rows = stmt
        .query_map([], read_to_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn upsert_ghost_cursor(conn: &Connection, cursor: &GhostCursor) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO ghost_cursors (agent_id, home, message_guid, assigned_at, session_ack)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(agent_id, home) DO UPDATE SET
            message_guid = ?3,
            assigned_at = ?4,
            session_ack = ?5
        "#,
        params![
            &cursor.agent_id,
            &cursor.home,
            &cursor.message_guid,
            cursor.assigned_at,
            cursor.session_ack
        ],
    )?;
    Ok(())
}

pub fn get_ghost_cursor(
    conn: &Connection,
    agent_id: &str,
    home: &str,
) -> Result<Option<GhostCursor>> {
    let result = conn
        .query_row(
            "SELECT agent_id, home, message_guid, assigned_at, session_ack FROM ghost_cursors
             WHERE agent_id = ?1 AND home = ?2",
            params![agent_id, home],
            ghost_from_row,
        )
        .optional()?;
    Ok(result)
}

/// Ack is idempotent: a second ack keeps the first ack time.
pub fn ack_ghost_cursor(conn: &Connection, agent_id: &str, home: &str, acked_at: i64) -> Result<()> {
    conn.execute(
        "UPDATE ghost_cursors SET session_ack = COALESCE(session_ack, ?3)
         WHERE agent_id = ?1 AND home = ?2",
        params![agent_id, home, acked_at],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_read_to_upsert_replaces() {
        let db = Database::open_in_memory().unwrap();
        let mut row = ReadTo {
            agent_id: "alice".to_string(),
            home: "room".to_string(),
            message_guid: "msg-1".to_string(),
            ts: 10,
            set_at: 11,
        };
        upsert_read_to(db.conn(), &row).unwrap();

        row.message_guid = "msg-2".to_string();
        row.ts = 20;
        upsert_read_to(db.conn(), &row).unwrap();

        let fetched = get_read_to(db.conn(), "alice", "room").unwrap().unwrap();
        assert_eq!(fetched.message_guid, "msg-2");
        assert_eq!(list_read_to(db.conn()).unwrap().len(), 1);
    }

    #[test]
    fn test_ghost_ack_idempotent() {
        let db = Database::open_in_memory().unwrap();
        upsert_ghost_cursor(
            db.conn(),
            &GhostCursor {
                agent_id: "alice".to_string(),
                home: "room".to_string(),
                message_guid: "msg-5".to_string(),
                assigned_at: 50,
                session_ack: None,
            },
        )
        .unwrap();

        ack_ghost_cursor(db.conn(), "alice", "room", 60).unwrap();
        ack_ghost_cursor(db.conn(), "alice", "room", 99).unwrap();

        let cursor = get_ghost_cursor(db.conn(), "alice", "room").unwrap().unwrap();
        assert_eq!(cursor.session_ack, Some(60));
    }
}
