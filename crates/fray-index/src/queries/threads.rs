use fray_types::{Thread, ThreadStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Error, Result};

const COLUMNS: &str =
    "guid, name, parent_guid, status, kind, anchor_guid, anchor_hidden, created_at";

fn from_row(row: &Row) -> rusqlite::Result<Thread> {
    let status: String = row.get(3)?;
    Ok(Thread {
        guid: row.get(0)?,
        name: row.get(1)?,
        parent_thread: row.get(2)?,
        status: ThreadStatus::parse(&status).unwrap_or(ThreadStatus::Open),
        kind: row.get(4)?,
        anchor: row.get(5)?,
        anchor_hidden: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn insert(conn: &Connection, thread: &Thread) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO threads (guid, name, parent_guid, status, kind, anchor_guid, anchor_hidden, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(guid) DO NOTHING
        "#,
        params![
            &thread.guid,
            &thread.name,
            &thread.parent_thread,
            thread.status.as_str(),
            &thread.kind,
            &thread.anchor,
            thread.anchor_hidden,
            thread.created_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, guid: &str) -> Result<Option<Thread>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM threads WHERE guid = ?1", COLUMNS),
            [guid],
            from_row,
        )
        .optional()?;
    Ok(result)
}

pub fn find_by_prefix(conn: &Connection, prefix: &str) -> Result<Option<String>> {
    let hex = prefix.strip_prefix("thrd-").unwrap_or(prefix);
    let pattern = format!("thrd-{}%", hex);

    let mut stmt = conn.prepare("SELECT guid FROM threads WHERE guid LIKE ?1 LIMIT 2")?;
    let mut matches: Vec<String> = stmt
        .query_map([&pattern], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches.remove(0))),
        _ => Err(Error::Query(format!(
            "Ambiguous thread prefix '{}': multiple threads match",
            prefix
        ))),
    }
}

/// Children of `parent` (`None` = root level) matching `name` exactly.
pub fn find_child_by_name(
    conn: &Connection,
    parent: Option<&str>,
    name: &str,
) -> Result<Vec<Thread>> {
    let mut stmt = match parent {
        Some(_) => conn.prepare(&format!(
            "SELECT {} FROM threads WHERE parent_guid = ?1 AND name = ?2",
            COLUMNS
        ))?,
        None => conn.prepare(&format!(
            "SELECT {} FROM threads WHERE parent_guid IS NULL AND name = ?1",
            COLUMNS
        ))?,
    };

    let threads = match parent {
        Some(p) => stmt
            .query_map(params![p, name], from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        None => stmt
            .query_map(params![name], from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
    };
    Ok(threads)
}

/// All threads whose name matches, at any level (root-name resolution).
pub fn find_by_name(conn: &Connection, name: &str) -> Result<Vec<Thread>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM threads WHERE name = ?1 COLLATE NOCASE",
        COLUMNS
    ))?;
    let threads = stmt
        .query_map([name], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(threads)
}

pub fn list(conn: &Connection) -> Result<Vec<Thread>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM threads ORDER BY name", COLUMNS))?;
    let threads = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(threads)
}

pub fn list_children(conn: &Connection, parent: &str) -> Result<Vec<Thread>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM threads WHERE parent_guid = ?1 ORDER BY name",
        COLUMNS
    ))?;
    let threads = stmt
        .query_map([parent], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(threads)
}

/// Depth of a thread: room = 0, a root thread = 1. Walks the parent chain;
/// a broken parent edge terminates the walk rather than erroring.
pub fn depth_of(conn: &Connection, guid: &str) -> Result<usize> {
    let mut depth = 0;
    let mut current = Some(guid.to_string());
    while let Some(id) = current {
        depth += 1;
        if depth > 64 {
            return Err(Error::Query(format!("thread parent chain loops at {}", id)));
        }
        current = conn
            .query_row("SELECT parent_guid FROM threads WHERE guid = ?1", [&id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();
    }
    Ok(depth)
}

/// Whether `candidate_ancestor` appears on `guid`'s parent chain (including
/// itself): the cycle test for moves.
pub fn is_ancestor(conn: &Connection, guid: &str, candidate_ancestor: &str) -> Result<bool> {
    let mut current = Some(guid.to_string());
    let mut hops = 0;
    while let Some(id) = current {
        if id == candidate_ancestor {
            return Ok(true);
        }
        hops += 1;
        if hops > 64 {
            return Ok(true);
        }
        current = conn
            .query_row("SELECT parent_guid FROM threads WHERE guid = ?1", [&id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();
    }
    Ok(false)
}

pub struct ThreadPatch<'a> {
    pub name: Option<&'a str>,
    pub parent_thread: Option<Option<&'a str>>,
    pub status: Option<ThreadStatus>,
    pub anchor: Option<Option<&'a str>>,
    pub anchor_hidden: Option<bool>,
}

impl Default for ThreadPatch<'_> {
    fn default() -> Self {
        Self {
            name: None,
            parent_thread: None,
            status: None,
            anchor: None,
            anchor_hidden: None,
        }
    }
}

pub fn apply_update(conn: &Connection, guid: &str, patch: &ThreadPatch) -> Result<()> {
    if let Some(name) = patch.name {
        conn.execute(
            "UPDATE threads SET name = ?1 WHERE guid = ?2",
            params![name, guid],
        )?;
    }
    if let Some(parent) = &patch.parent_thread {
        conn.execute(
            "UPDATE threads SET parent_guid = ?1 WHERE guid = ?2",
            params![parent.map(|s| s.to_string()), guid],
        )?;
    }
    if let Some(status) = &patch.status {
        conn.execute(
            "UPDATE threads SET status = ?1 WHERE guid = ?2",
            params![status.as_str(), guid],
        )?;
    }
    if let Some(anchor) = &patch.anchor {
        conn.execute(
            "UPDATE threads SET anchor_guid = ?1 WHERE guid = ?2",
            params![anchor.map(|s| s.to_string()), guid],
        )?;
    }
    if let Some(hidden) = patch.anchor_hidden {
        conn.execute(
            "UPDATE threads SET anchor_hidden = ?1 WHERE guid = ?2",
            params![hidden, guid],
        )?;
    }
    Ok(())
}

// --- membership / pins / subscriptions ---

pub fn add_message(
    conn: &Connection,
    thread_guid: &str,
    message_guid: &str,
    added_by: &str,
    added_at: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO thread_messages (thread_guid, message_guid, added_by, added_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![thread_guid, message_guid, added_by, added_at],
    )?;
    Ok(())
}

pub fn remove_message(conn: &Connection, thread_guid: &str, message_guid: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM thread_messages WHERE thread_guid = ?1 AND message_guid = ?2",
        params![thread_guid, message_guid],
    )?;
    Ok(())
}

pub fn has_message(conn: &Connection, thread_guid: &str, message_guid: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM thread_messages WHERE thread_guid = ?1 AND message_guid = ?2",
            params![thread_guid, message_guid],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn pin_message(
    conn: &Connection,
    thread_guid: &str,
    message_guid: &str,
    pinned_by: &str,
    pinned_at: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO thread_pins (thread_guid, message_guid, pinned_by, pinned_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![thread_guid, message_guid, pinned_by, pinned_at],
    )?;
    Ok(())
}

pub fn unpin_message(conn: &Connection, thread_guid: &str, message_guid: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM thread_pins WHERE thread_guid = ?1 AND message_guid = ?2",
        params![thread_guid, message_guid],
    )?;
    Ok(())
}

pub fn subscribe(conn: &Connection, thread_guid: &str, agent_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO thread_subscriptions (thread_guid, agent_id, muted) VALUES (?1, ?2, 0)",
        params![thread_guid, agent_id],
    )?;
    Ok(())
}

pub fn unsubscribe(conn: &Connection, thread_guid: &str, agent_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM thread_subscriptions WHERE thread_guid = ?1 AND agent_id = ?2",
        params![thread_guid, agent_id],
    )?;
    Ok(())
}

pub fn set_muted(conn: &Connection, thread_guid: &str, agent_id: &str, muted: bool) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO thread_subscriptions (thread_guid, agent_id, muted)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(thread_guid, agent_id) DO UPDATE SET muted = ?3
        "#,
        params![thread_guid, agent_id, muted],
    )?;
    Ok(())
}

pub fn subscribers(conn: &Connection, thread_guid: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT agent_id FROM thread_subscriptions WHERE thread_guid = ?1 AND muted = 0 ORDER BY agent_id",
    )?;
    let subs = stmt
        .query_map([thread_guid], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(subs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn thread(guid: &str, name: &str, parent: Option<&str>) -> Thread {
        Thread {
            guid: guid.to_string(),
            name: name.to_string(),
            parent_thread: parent.map(|s| s.to_string()),
            status: ThreadStatus::Open,
            kind: None,
            anchor: None,
            anchor_hidden: false,
            created_at: 0,
        }
    }

    #[test]
    fn test_depth_walk() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &thread("thrd-a", "a", None)).unwrap();
        insert(db.conn(), &thread("thrd-b", "b", Some("thrd-a"))).unwrap();
        insert(db.conn(), &thread("thrd-c", "c", Some("thrd-b"))).unwrap();

        assert_eq!(depth_of(db.conn(), "thrd-a").unwrap(), 1);
        assert_eq!(depth_of(db.conn(), "thrd-c").unwrap(), 3);
    }

    #[test]
    fn test_is_ancestor() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &thread("thrd-a", "a", None)).unwrap();
        insert(db.conn(), &thread("thrd-b", "b", Some("thrd-a"))).unwrap();

        assert!(is_ancestor(db.conn(), "thrd-b", "thrd-a").unwrap());
        assert!(is_ancestor(db.conn(), "thrd-b", "thrd-b").unwrap());
        assert!(!is_ancestor(db.conn(), "thrd-a", "thrd-b").unwrap());
    }

    #[test]
    fn test_find_child_by_name_scoped_to_parent() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &thread("thrd-a", "notes", None)).unwrap();
        insert(db.conn(), &thread("thrd-b", "notes", Some("thrd-a"))).unwrap();

        let at_root = find_child_by_name(db.conn(), None, "notes").unwrap();
        assert_eq!(at_root.len(), 1);
        assert_eq!(at_root[0].guid, "thrd-a");

        let under_a = find_child_by_name(db.conn(), Some("thrd-a"), "notes").unwrap();
        assert_eq!(under_a.len(), 1);
        assert_eq!(under_a[0].guid, "thrd-b");
    }

    #[test]
    fn test_membership_idempotent() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &thread("thrd-a", "a", None)).unwrap();

        add_message(db.conn(), "thrd-a", "msg-1", "alice", 5).unwrap();
        add_message(db.conn(), "thrd-a", "msg-1", "bob", 9).unwrap();

        assert!(has_message(db.conn(), "thrd-a", "msg-1").unwrap());
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM thread_messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_mute_excluded_from_subscribers() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &thread("thrd-a", "a", None)).unwrap();
        subscribe(db.conn(), "thrd-a", "alice").unwrap();
        subscribe(db.conn(), "thrd-a", "bob").unwrap();
        set_muted(db.conn(), "thrd-a", "bob", true).unwrap();

        assert_eq!(subscribers(db.conn(), "thrd-a").unwrap(), vec!["alice"]);
    }
}
