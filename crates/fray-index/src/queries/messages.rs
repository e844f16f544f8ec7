use fray_types::{Message, MessageKind};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Error, Result};

const COLUMNS: &str = "guid, ts, seq, origin, from_agent, body, kind, home, reply_to, quote, \
                       ref_guid, surface_source, edited_at, archived_at";

fn from_row(row: &Row) -> rusqlite::Result<Message> {
    let kind: String = row.get(6)?;
    Ok(Message {
        guid: row.get(0)?,
        ts: row.get(1)?,
        from_agent: row.get(4)?,
        // A cleared body reads back as empty
        body: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        mentions: Vec::new(),
        kind: MessageKind::parse(&kind).unwrap_or(MessageKind::Agent),
        home: row.get(7)?,
        reply_to: row.get(8)?,
        quote: row.get(9)?,
        references: row.get(10)?,
        surface_source: row.get(11)?,
        edited_at: row.get(12)?,
        archived_at: row.get(13)?,
        origin: row.get(3)?,
    })
}

fn attach_mentions(conn: &Connection, message: &mut Message) -> Result<()> {
    let mut stmt =
        conn.prepare("SELECT agent_id FROM mentions WHERE message_guid = ?1 ORDER BY agent_id")?;
    message.mentions = stmt
        .query_map([&message.guid], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(())
}

pub fn insert(conn: &Connection, message: &Message, seq: u64) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO messages (guid, ts, seq, origin, from_agent, body, kind, home, reply_to,
                              quote, ref_guid, surface_source, edited_at, archived_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(guid) DO NOTHING
        "#,
        params![
            &message.guid,
            message.ts,
            seq as i64,
            &message.origin,
            &message.from_agent,
            &message.body,
            message.kind.as_str(),
            &message.home,
            &message.reply_to,
            &message.quote,
            &message.references,
            &message.surface_source,
            message.edited_at,
            message.archived_at,
        ],
    )?;

    for mention in &message.mentions {
        conn.execute(
            "INSERT OR IGNORE INTO mentions (message_guid, agent_id) VALUES (?1, ?2)",
            params![&message.guid, mention],
        )?;
    }

    Ok(())
}

pub fn exists(conn: &Connection, guid: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM messages WHERE guid = ?1", [guid], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn get(conn: &Connection, guid: &str) -> Result<Option<Message>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM messages WHERE guid = ?1", COLUMNS),
            [guid],
            from_row,
        )
        .optional()?;

    match result {
        Some(mut message) => {
            attach_mentions(conn, &mut message)?;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

/// Find a message by GUID prefix (with or without the `msg-` tag).
/// Two or more matches are an error surfaced to the caller, never a pick.
pub fn find_by_prefix(conn: &Connection, prefix: &str) -> Result<Option<String>> {
    let hex = prefix.strip_prefix("msg-").unwrap_or(prefix);
    let pattern = format!("msg-{}%", hex);

    let mut stmt = conn.prepare("SELECT guid FROM messages WHERE guid LIKE ?1 LIMIT 2")?;
    let mut matches: Vec<String> = stmt
        .query_map([&pattern], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches.remove(0))),
        _ => Err(Error::Query(format!(
            "Ambiguous message prefix '{}': multiple messages match",
            prefix
        ))),
    }
}

pub fn list_home(conn: &Connection, home: &str, limit: usize) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM (
            SELECT {} FROM messages
            WHERE home = ?1 AND archived_at IS NULL
            ORDER BY ts DESC, seq DESC
            LIMIT ?2
        ) ORDER BY ts ASC, seq ASC
        "#,
        COLUMNS, COLUMNS
    ))?;

    let mut messages = stmt
        .query_map(params![home, limit as i64], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for message in &mut messages {
        attach_mentions(conn, message)?;
    }
    Ok(messages)
}

/// Mentions of `agent_id` strictly after `(after_ts, after_seq)` in canonical
/// order, excluding archived messages. Self-authored messages are excluded by
/// base name at the caller.
pub fn mentions_after(
    conn: &Connection,
    agent_id: &str,
    after: Option<(i64, i64)>,
) -> Result<Vec<Message>> {
    let (after_ts, after_seq) = after.unwrap_or((-1, -1));
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM messages m
        JOIN mentions mn ON mn.message_guid = m.guid
        WHERE mn.agent_id = ?1
          AND m.archived_at IS NULL
          AND (m.ts > ?2 OR (m.ts = ?2 AND m.seq > ?3))
        ORDER BY m.ts ASC, m.seq ASC
        "#,
        COLUMNS
            .split(", ")
            .map(|c| format!("m.{}", c))
            .collect::<Vec<_>>()
            .join(", ")
    ))?;

    let mut messages = stmt
        .query_map(params![agent_id, after_ts, after_seq], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for message in &mut messages {
        attach_mentions(conn, message)?;
    }
    Ok(messages)
}

/// Timestamp of the agent's most recent post at or after `since_ts`, the
/// supervisor's activity signal.
pub fn last_post_ts(conn: &Connection, from_agent: &str, since_ts: i64) -> Result<Option<i64>> {
    let result = conn
        .query_row(
            "SELECT MAX(ts) FROM messages WHERE from_agent = ?1 AND ts >= ?2",
            params![from_agent, since_ts],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?
        .flatten();
    Ok(result)
}

pub fn ts_and_seq(conn: &Connection, guid: &str) -> Result<Option<(i64, i64)>> {
    let result = conn
        .query_row(
            "SELECT ts, seq FROM messages WHERE guid = ?1",
            [guid],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(result)
}

pub struct MessagePatch<'a> {
    pub body: Option<Option<&'a str>>,
    pub edited_at: Option<Option<i64>>,
    pub archived_at: Option<Option<i64>>,
}

pub fn apply_update(conn: &Connection, guid: &str, patch: &MessagePatch) -> Result<()> {
    if let Some(body) = &patch.body {
        conn.execute(
            "UPDATE messages SET body = ?1 WHERE guid = ?2",
            params![body.map(|s| s.to_string()), guid],
        )?;
    }
    if let Some(edited_at) = &patch.edited_at {
        conn.execute(
            "UPDATE messages SET edited_at = ?1 WHERE guid = ?2",
            params![edited_at, guid],
        )?;
    }
    if let Some(archived_at) = &patch.archived_at {
        conn.execute(
            "UPDATE messages SET archived_at = ?1 WHERE guid = ?2",
            params![archived_at, guid],
        )?;
    }
    Ok(())
}
