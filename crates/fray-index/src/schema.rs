use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 1;

// Local-state tables survive a version bump; everything else is derived from
// the logs and dropped on mismatch. Ghost cursors are rederived from
// local/runtime.jsonl, so they count as derived here.
const DERIVED_TABLES: &[&str] = &[
    "agents",
    "messages",
    "mentions",
    "threads",
    "thread_messages",
    "thread_pins",
    "thread_subscriptions",
    "questions",
    "claims",
    "reactions",
    "agent_sessions",
    "ghost_cursors",
    "collisions",
];

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_derived_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            guid TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL UNIQUE,
            goal TEXT,
            bio TEXT,
            presence TEXT NOT NULL DEFAULT 'offline',
            status TEXT,
            last_seen INTEGER NOT NULL DEFAULT 0,
            left_at INTEGER,
            managed BOOLEAN NOT NULL DEFAULT 0,
            invoke_json TEXT,
            mention_watermark TEXT,
            identity_guid TEXT,
            avatar TEXT,
            registered_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS messages (
            guid TEXT PRIMARY KEY,
            ts INTEGER NOT NULL,
            seq INTEGER NOT NULL DEFAULT 0,
            origin TEXT NOT NULL DEFAULT '',
            from_agent TEXT NOT NULL,
            body TEXT,
            kind TEXT NOT NULL,
            home TEXT NOT NULL,
            reply_to TEXT,
            quote TEXT,
            ref_guid TEXT,
            surface_source TEXT,
            edited_at INTEGER,
            archived_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS mentions (
            message_guid TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            PRIMARY KEY (message_guid, agent_id)
        );

        CREATE TABLE IF NOT EXISTS threads (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            parent_guid TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            kind TEXT,
            anchor_guid TEXT,
            anchor_hidden BOOLEAN NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS thread_messages (
            thread_guid TEXT NOT NULL,
            message_guid TEXT NOT NULL,
            added_by TEXT NOT NULL,
            added_at INTEGER NOT NULL,
            PRIMARY KEY (thread_guid, message_guid)
        );

        CREATE TABLE IF NOT EXISTS thread_pins (
            thread_guid TEXT NOT NULL,
            message_guid TEXT NOT NULL,
            pinned_by TEXT NOT NULL,
            pinned_at INTEGER NOT NULL,
            PRIMARY KEY (thread_guid, message_guid)
        );

        CREATE TABLE IF NOT EXISTS thread_subscriptions (
            thread_guid TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            muted BOOLEAN NOT NULL DEFAULT 0,
            PRIMARY KEY (thread_guid, agent_id)
        );

        CREATE TABLE IF NOT EXISTS questions (
            guid TEXT PRIMARY KEY,
            re TEXT NOT NULL,
            from_agent TEXT NOT NULL,
            to_agent TEXT,
            status TEXT NOT NULL,
            thread_guid TEXT,
            asked_in TEXT,
            answered_in TEXT,
            created_at INTEGER NOT NULL,
            options_json TEXT
        );

        CREATE TABLE IF NOT EXISTS claims (
            claim_type TEXT NOT NULL,
            pattern TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            claimed_at INTEGER NOT NULL,
            PRIMARY KEY (claim_type, pattern)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            message_guid TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            emoji TEXT NOT NULL,
            ts INTEGER NOT NULL,
            PRIMARY KEY (message_guid, agent_id, emoji)
        );

        CREATE TABLE IF NOT EXISTS agent_sessions (
            session_id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            triggered_by TEXT,
            ended_at INTEGER,
            end_reason TEXT
        );

        CREATE TABLE IF NOT EXISTS ghost_cursors (
            agent_id TEXT NOT NULL,
            home TEXT NOT NULL,
            message_guid TEXT NOT NULL,
            assigned_at INTEGER NOT NULL,
            session_ack INTEGER,
            PRIMARY KEY (agent_id, home)
        );

        CREATE TABLE IF NOT EXISTS collisions (
            guid TEXT NOT NULL,
            origin TEXT NOT NULL,
            ts INTEGER NOT NULL,
            preview TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS read_to (
            agent_id TEXT NOT NULL,
            home TEXT NOT NULL,
            message_guid TEXT NOT NULL,
            ts INTEGER NOT NULL,
            set_at INTEGER NOT NULL,
            PRIMARY KEY (agent_id, home)
        );

        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_home_ts ON messages(home, ts);
        CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(ts);
        CREATE INDEX IF NOT EXISTS idx_mentions_agent ON mentions(agent_id);
        CREATE INDEX IF NOT EXISTS idx_threads_parent_name ON threads(parent_guid, name);
        CREATE INDEX IF NOT EXISTS idx_questions_status ON questions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_agent ON agent_sessions(agent_id, started_at);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

/// Drop everything derived from the logs; `read_to` and `config` stay.
pub fn drop_derived_tables(conn: &Connection) -> Result<()> {
    for table in DERIVED_TABLES {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", table))?;
    }
    Ok(())
}
