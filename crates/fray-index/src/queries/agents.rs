use fray_types::{Agent, InvokeConfig, Presence};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Error, Result};

fn from_row(row: &Row) -> rusqlite::Result<Agent> {
    let presence: String = row.get(4)?;
    let invoke_json: Option<String> = row.get(9)?;
    Ok(Agent {
        guid: row.get(0)?,
        agent_id: row.get(1)?,
        goal: row.get(2)?,
        bio: row.get(3)?,
        presence: Presence::parse(&presence).unwrap_or(Presence::Offline),
        status: row.get(5)?,
        last_seen: row.get(6)?,
        left_at: row.get(7)?,
        managed: row.get(8)?,
        invoke: invoke_json.and_then(|json| serde_json::from_str::<InvokeConfig>(&json).ok()),
        mention_watermark: row.get(10)?,
        identity_guid: row.get(11)?,
        avatar: row.get(12)?,
        registered_at: row.get(13)?,
    })
}

const COLUMNS: &str = "guid, agent_id, goal, bio, presence, status, last_seen, left_at, \
                       managed, invoke_json, mention_watermark, identity_guid, avatar, registered_at";

pub fn insert(conn: &Connection, agent: &Agent) -> Result<()> {
    let invoke_json = agent
        .invoke
        .as_ref()
        .map(|i| serde_json::to_string(i))
        .transpose()
        .map_err(|e| Error::Query(format!("invoke config: {}", e)))?;

    conn.execute(
        r#"
        INSERT INTO agents (guid, agent_id, goal, bio, presence, status, last_seen, left_at,
                            managed, invoke_json, mention_watermark, identity_guid, avatar, registered_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(guid) DO NOTHING
        "#,
        params![
            &agent.guid,
            &agent.agent_id,
            &agent.goal,
            &agent.bio,
            agent.presence.as_str(),
            &agent.status,
            agent.last_seen,
            agent.left_at,
            agent.managed,
            &invoke_json,
            &agent.mention_watermark,
            &agent.identity_guid,
            &agent.avatar,
            agent.registered_at,
        ],
    )?;

    Ok(())
}

pub fn get_by_guid(conn: &Connection, guid: &str) -> Result<Option<Agent>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM agents WHERE guid = ?1", COLUMNS),
            [guid],
            from_row,
        )
        .optional()?;
    Ok(result)
}

pub fn get_by_agent_id(conn: &Connection, agent_id: &str) -> Result<Option<Agent>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM agents WHERE agent_id = ?1", COLUMNS),
            [agent_id],
            from_row,
        )
        .optional()?;
    Ok(result)
}

pub fn get_by_agent_id_ci(conn: &Connection, agent_id: &str) -> Result<Vec<Agent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM agents WHERE agent_id = ?1 COLLATE NOCASE",
        COLUMNS
    ))?;
    let agents = stmt
        .query_map([agent_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(agents)
}

pub fn list(conn: &Connection) -> Result<Vec<Agent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM agents ORDER BY agent_id",
        COLUMNS
    ))?;
    let agents = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(agents)
}

/// Agents that have not left; the `@all` expansion set.
pub fn list_present(conn: &Connection) -> Result<Vec<Agent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM agents WHERE left_at IS NULL ORDER BY agent_id",
        COLUMNS
    ))?;
    let agents = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(agents)
}

pub fn list_managed(conn: &Connection) -> Result<Vec<Agent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM agents WHERE managed = 1 AND left_at IS NULL ORDER BY agent_id",
        COLUMNS
    ))?;
    let agents = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(agents)
}

pub struct AgentPatch<'a> {
    pub goal: Option<Option<&'a str>>,
    pub bio: Option<Option<&'a str>>,
    pub presence: Option<Presence>,
    pub status: Option<Option<&'a str>>,
    pub last_seen: Option<Option<i64>>,
    pub left_at: Option<Option<i64>>,
    pub invoke: Option<Option<&'a InvokeConfig>>,
    pub mention_watermark: Option<Option<&'a str>>,
    pub avatar: Option<Option<&'a str>>,
}

impl Default for AgentPatch<'_> {
    fn default() -> Self {
        Self {
            goal: None,
            bio: None,
            presence: None,
            status: None,
            last_seen: None,
            left_at: None,
            invoke: None,
            mention_watermark: None,
            avatar: None,
        }
    }
}

/// Apply a tri-state update: absent fields untouched, `Some(None)` clears,
/// `Some(Some(v))` sets.
pub fn apply_update(conn: &Connection, guid: &str, patch: &AgentPatch) -> Result<()> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(goal) = patch.goal {
        sets.push(format!("goal = ?{}", values.len() + 1));
        values.push(Box::new(goal.map(|s| s.to_string())));
    }
    if let Some(bio) = patch.bio {
        sets.push(format!("bio = ?{}", values.len() + 1));
        values.push(Box::new(bio.map(|s| s.to_string())));
    }
    if let Some(presence) = patch.presence {
        sets.push(format!("presence = ?{}", values.len() + 1));
        values.push(Box::new(presence.as_str().to_string()));
    }
    if let Some(status) = patch.status {
        sets.push(format!("status = ?{}", values.len() + 1));
        values.push(Box::new(status.map(|s| s.to_string())));
    }
    if let Some(last_seen) = patch.last_seen {
        sets.push(format!("last_seen = ?{}", values.len() + 1));
        values.push(Box::new(last_seen.unwrap_or(0)));
    }
    if let Some(left_at) = patch.left_at {
        sets.push(format!("left_at = ?{}", values.len() + 1));
        values.push(Box::new(left_at));
    }
    if let Some(invoke) = patch.invoke {
        let json = invoke
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Query(format!("invoke config: {}", e)))?;
        sets.push(format!("invoke_json = ?{}", values.len() + 1));
        values.push(Box::new(json));
    }
    if let Some(watermark) = patch.mention_watermark {
        sets.push(format!("mention_watermark = ?{}", values.len() + 1));
        values.push(Box::new(watermark.map(|s| s.to_string())));
    }
    if let Some(avatar) = patch.avatar {
        sets.push(format!("avatar = ?{}", values.len() + 1));
        values.push(Box::new(avatar.map(|s| s.to_string())));
    }

    if sets.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "UPDATE agents SET {} WHERE guid = ?{}",
        sets.join(", "),
        values.len() + 1
    );
    values.push(Box::new(guid.to_string()));

    let params = rusqlite::params_from_iter(values.iter().map(|v| v.as_ref()));
    conn.execute(&sql, params)?;
    Ok(())
}

pub fn set_presence(conn: &Connection, guid: &str, presence: Presence, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE agents SET presence = ?1, last_seen = ?2 WHERE guid = ?3",
        params![presence.as_str(), now, guid],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn agent(guid: &str, agent_id: &str) -> Agent {
        Agent {
            guid: guid.to_string(),
            agent_id: agent_id.to_string(),
            goal: None,
            bio: None,
            presence: Presence::Offline,
            status: None,
            last_seen: 0,
            left_at: None,
            managed: false,
            invoke: None,
            mention_watermark: None,
            identity_guid: None,
            avatar: None,
            registered_at: 100,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &agent("usr-1", "alice")).unwrap();

        let by_guid = get_by_guid(db.conn(), "usr-1").unwrap().unwrap();
        assert_eq!(by_guid.agent_id, "alice");

        let by_name = get_by_agent_id(db.conn(), "alice").unwrap().unwrap();
        assert_eq!(by_name.guid, "usr-1");

        let ci = get_by_agent_id_ci(db.conn(), "ALICE").unwrap();
        assert_eq!(ci.len(), 1);
    }

    #[test]
    fn test_apply_update_tri_state() {
        let db = Database::open_in_memory().unwrap();
        let mut a = agent("usr-1", "alice");
        a.goal = Some("ship it".to_string());
        insert(db.conn(), &a).unwrap();

        // Set bio, clear goal, leave everything else untouched
        apply_update(
            db.conn(),
            "usr-1",
            &AgentPatch {
                goal: Some(None),
                bio: Some(Some("bot")),
                ..AgentPatch::default()
            },
        )
        .unwrap();

        let updated = get_by_guid(db.conn(), "usr-1").unwrap().unwrap();
        assert_eq!(updated.goal, None);
        assert_eq!(updated.bio, Some("bot".to_string()));
        assert_eq!(updated.registered_at, 100);
    }

    #[test]
    fn test_left_agents_excluded_from_present() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &agent("usr-1", "alice")).unwrap();
        insert(db.conn(), &agent("usr-2", "bob")).unwrap();

        apply_update(
            db.conn(),
            "usr-2",
            &AgentPatch {
                left_at: Some(Some(500)),
                ..AgentPatch::default()
            },
        )
        .unwrap();

        let present = list_present(db.conn()).unwrap();
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].agent_id, "alice");
    }
}
