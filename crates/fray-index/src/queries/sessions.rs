use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;

/// Supervision session row, folded from session-starts / session-ends.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSession {
    pub session_id: String,
    pub agent_id: String,
    pub started_at: i64,
    pub triggered_by: Option<String>,
    pub ended_at: Option<i64>,
    pub end_reason: Option<String>,
}

fn from_row(row: &Row) -> rusqlite::Result<AgentSession> {
    Ok(AgentSession {
        session_id: row.get(0)?,
        agent_id: row.get(1)?,
        started_at: row.get(2)?,
        triggered_by: row.get(3)?,
        ended_at: row.get(4)?,
        end_reason: row.get(5)?,
    })
}

const COLUMNS: &str = "session_id, agent_id, started_at, triggered_by, ended_at, end_reason";

pub fn record_start(
    conn: &Connection,
    session_id: &str,
    agent_id: &str,
    started_at: i64,
    triggered_by: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO agent_sessions (session_id, agent_id, started_at, triggered_by)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(session_id) DO NOTHING
        "#,
        params![session_id, agent_id, started_at, triggered_by],
    )?;
    Ok(())
}

pub fn record_end(conn: &Connection, session_id: &str, ended_at: i64, reason: &str) -> Result<()> {
    conn.execute(
        r#"
        UPDATE agent_sessions SET ended_at = COALESCE(ended_at, ?2),
                                  end_reason = COALESCE(end_reason, ?3)
        WHERE session_id = ?1
        "#,
        params![session_id, ended_at, reason],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, session_id: &str) -> Result<Option<AgentSession>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM agent_sessions WHERE session_id = ?1", COLUMNS),
            [session_id],
            from_row,
        )
        .optional()?;
    Ok(result)
}

/// Sessions with a start but no end: orphans the supervisor must repair.
pub fn list_open(conn: &Connection) -> Result<Vec<AgentSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM agent_sessions WHERE ended_at IS NULL ORDER BY started_at",
        COLUMNS
    ))?;
    let sessions = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sessions)
}

/// Completed sessions for one agent, newest first.
pub fn list_ended_for(conn: &Connection, agent_id: &str) -> Result<Vec<AgentSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM agent_sessions WHERE agent_id = ?1 AND ended_at IS NOT NULL
         ORDER BY started_at DESC",
        COLUMNS
    ))?;
    let sessions = stmt
        .query_map([agent_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_start_then_end() {
        let db = Database::open_in_memory().unwrap();
        record_start(db.conn(), "s-1", "alice", 100, Some("msg-9")).unwrap();

        let open = list_open(db.conn()).unwrap();
        assert_eq!(open.len(), 1);

        record_end(db.conn(), "s-1", 200, "done").unwrap();
        assert!(list_open(db.conn()).unwrap().is_empty());

        let session = get(db.conn(), "s-1").unwrap().unwrap();
        assert_eq!(session.ended_at, Some(200));
        assert_eq!(session.end_reason, Some("done".to_string()));
    }

    #[test]
    fn test_end_does_not_overwrite_first_end() {
        let db = Database::open_in_memory().unwrap();
        record_start(db.conn(), "s-1", "alice", 100, None).unwrap();
        record_end(db.conn(), "s-1", 200, "idle").unwrap();
        record_end(db.conn(), "s-1", 300, "zombie").unwrap();

        let session = get(db.conn(), "s-1").unwrap().unwrap();
        assert_eq!(session.ended_at, Some(200));
        assert_eq!(session.end_reason, Some("idle".to_string()));
    }
}
