use fray_core::AgentRef;
use fray_index::queries;
use fray_types::{
    Agent, AgentRecord, AgentUpdateRecord, IdKind, InvokeConfig, LogRecord, Stamp, new_id, now_ts,
};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::resolve;

pub struct JoinParams {
    pub agent_id: String,
    pub goal: Option<String>,
    pub bio: Option<String>,
    pub managed: bool,
    pub invoke: Option<InvokeConfig>,
    pub avatar: Option<String>,
}

/// Register a new agent (a human `join` or a `create managed`). The handle
/// must parse as a bare agent name and be unused.
pub fn join(channel: &mut Channel, params: JoinParams) -> Result<Agent> {
    let reference = AgentRef::parse(&params.agent_id)
        .ok_or_else(|| Error::InvalidInput(format!("bad agent handle: {}", params.agent_id)))?;
    if reference.host.is_some() {
        return Err(Error::InvalidInput(
            "agent handles are registered without a host qualifier".to_string(),
        ));
    }
    let handle = reference.qualified();

    if queries::agents::get_by_agent_id(channel.db().conn(), &handle)?.is_some() {
        return Err(Error::Conflict(format!("agent '{}' already exists", handle)));
    }
    if params.managed && params.invoke.is_none() {
        return Err(Error::InvalidInput(
            "managed agents need an invoke config (--driver at minimum)".to_string(),
        ));
    }

    let now = now_ts();
    let record = AgentRecord {
        id: new_id(IdKind::Agent),
        agent_id: handle.clone(),
        goal: params.goal,
        bio: params.bio,
        managed: params.managed,
        invoke: params.invoke,
        identity_guid: None,
        avatar: params.avatar,
        registered_at: now,
        last_seen: now,
        stamp: Stamp::default(),
    };
    let guid = record.id.clone();

    channel.commit(vec![LogRecord::Agent(record)], vec![])?;

    channel.config_mut().remember_agent(&handle);
    channel.save_config()?;

    queries::agents::get_by_guid(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("agent {} missing after commit", guid)))
}

#[derive(Default)]
pub struct AgentUpdateParams {
    pub goal: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub status: Option<Option<String>>,
    pub invoke: Option<Option<InvokeConfig>>,
    pub avatar: Option<Option<String>>,
}

/// Record a discrete update for an agent; absent fields stay untouched.
pub fn update(channel: &mut Channel, token: &str, params: AgentUpdateParams) -> Result<Agent> {
    let agent = get(channel, token)?;

    let record = AgentUpdateRecord {
        id: agent.guid.clone(),
        goal: params.goal,
        bio: params.bio,
        status: params.status,
        invoke: params.invoke,
        avatar: params.avatar,
        last_seen: Some(Some(now_ts())),
        ..AgentUpdateRecord::default()
    };

    channel.commit(vec![LogRecord::AgentUpdate(record)], vec![])?;
    get(channel, &agent.guid)
}

/// Mark an agent as having left. The row (and its history) stays.
pub fn leave(channel: &mut Channel, token: &str) -> Result<Agent> {
    let agent = get(channel, token)?;
    if agent.left_at.is_some() {
        return Err(Error::Conflict(format!(
            "agent '{}' has already left",
            agent.agent_id
        )));
    }

    let record = AgentUpdateRecord {
        id: agent.guid.clone(),
        left_at: Some(Some(now_ts())),
        presence: Some(Some(fray_types::Presence::Offline)),
        ..AgentUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::AgentUpdate(record)], vec![])?;
    get(channel, &agent.guid)
}

pub fn get(channel: &Channel, token: &str) -> Result<Agent> {
    let handle = resolve::resolve_agent(channel.db().conn(), token, true)?;
    queries::agents::get_by_agent_id(channel.db().conn(), &handle)?
        .ok_or_else(|| Error::NotFound(format!("no agent named {}", handle)))
}

pub fn list(channel: &Channel) -> Result<Vec<Agent>> {
    Ok(queries::agents::list(channel.db().conn())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use tempfile::TempDir;

    fn open_channel(temp: &TempDir) -> Channel {
        Channel::init(temp.path(), "test").unwrap()
    }

    #[test]
    fn test_join_and_duplicate_conflict() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let agent = join(
            &mut channel,
            JoinParams {
                agent_id: "alice".to_string(),
                goal: Some("ship".to_string()),
                bio: None,
                managed: false,
                invoke: None,
                avatar: None,
            },
        )
        .unwrap();
        assert!(agent.guid.starts_with("usr-"));
        assert_eq!(agent.goal, Some("ship".to_string()));

        let duplicate = join(
            &mut channel,
            JoinParams {
                agent_id: "alice".to_string(),
                goal: None,
                bio: None,
                managed: false,
                invoke: None,
                avatar: None,
            },
        );
        assert!(matches!(duplicate, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_update_clears_and_sets() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        join(
            &mut channel,
            JoinParams {
                agent_id: "alice".to_string(),
                goal: Some("old goal".to_string()),
                bio: None,
                managed: false,
                invoke: None,
                avatar: None,
            },
        )
        .unwrap();

        let updated = update(
            &mut channel,
            "alice",
            AgentUpdateParams {
                goal: Some(None),
                status: Some(Some("heads down".to_string())),
                ..AgentUpdateParams::default()
            },
        )
        .unwrap();

        assert_eq!(updated.goal, None);
        assert_eq!(updated.status, Some("heads down".to_string()));
    }

    #[test]
    fn test_leave_is_terminal_but_not_deleted() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        join(
            &mut channel,
            JoinParams {
                agent_id: "bob".to_string(),
                goal: None,
                bio: None,
                managed: false,
                invoke: None,
                avatar: None,
            },
        )
        .unwrap();

        let left = leave(&mut channel, "bob").unwrap();
        assert!(left.left_at.is_some());

        assert!(matches!(leave(&mut channel, "bob"), Err(Error::Conflict(_))));
        assert_eq!(list(&channel).unwrap().len(), 1);
    }

    #[test]
    fn test_managed_requires_invoke() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        let result = join(
            &mut channel,
            JoinParams {
                agent_id: "worker".to_string(),
                goal: None,
                bio: None,
                managed: true,
                invoke: None,
                avatar: None,
            },
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
