use fray_index::queries;
use fray_types::{
    Claim, ClaimClearRecord, ClaimRecord, ClaimType, IdKind, LogRecord, MessageKind,
    MessageRecord, ROOM, Stamp, new_id, now_ts,
};

use crate::channel::Channel;
use crate::error::{Error, Result};

/// Claim exclusive ownership of a work item. A live claim by someone else
/// fails with a conflict unless forced.
pub fn claim(
    channel: &mut Channel,
    agent_id: &str,
    claim_type: ClaimType,
    pattern: &str,
    force: bool,
) -> Result<Claim> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(Error::InvalidInput("claim pattern cannot be empty".to_string()));
    }

    if let Some(existing) = queries::claims::get(channel.db().conn(), claim_type, pattern)? {
        if existing.agent_id == agent_id {
            return Ok(existing);
        }
        if !force {
            return Err(Error::Conflict(format!(
                "{} '{}' is claimed by {}",
                claim_type.as_str(),
                pattern,
                existing.agent_id
            )));
        }
    }

    let record = ClaimRecord {
        claim_type,
        pattern: pattern.to_string(),
        agent_id: agent_id.to_string(),
        claimed_at: now_ts(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::Claim(record)], vec![])?;

    queries::claims::get(channel.db().conn(), claim_type, pattern)?
        .ok_or_else(|| Error::NotFound("claim missing after commit".to_string()))
}

/// Clear claims held by an agent: all of them, or a single (type, pattern).
/// Clearing is announced with an ordinary room message so other agents see
/// the release.
pub fn clear(
    channel: &mut Channel,
    agent_id: &str,
    target: Option<(ClaimType, &str)>,
) -> Result<Vec<Claim>> {
    let cleared: Vec<Claim> = match target {
        Some((claim_type, pattern)) => {
            match queries::claims::get(channel.db().conn(), claim_type, pattern)? {
                Some(existing) if existing.agent_id == agent_id => vec![existing],
                Some(existing) => {
                    return Err(Error::Conflict(format!(
                        "{} '{}' is held by {}, not {}",
                        claim_type.as_str(),
                        pattern,
                        existing.agent_id,
                        agent_id
                    )));
                }
                None => vec![],
            }
        }
        None => queries::claims::list_for(channel.db().conn(), agent_id)?,
    };

    if cleared.is_empty() {
        return Ok(cleared);
    }

    let clear_record = ClaimClearRecord {
        agent_id: agent_id.to_string(),
        claim_type: target.map(|(t, _)| t),
        pattern: target.map(|(_, p)| p.to_string()),
        stamp: Stamp::default(),
    };

    let summary = cleared
        .iter()
        .map(|c| format!("{}:{}", c.claim_type.as_str(), c.pattern))
        .collect::<Vec<_>>()
        .join(", ");
    let announce = MessageRecord {
        id: new_id(IdKind::Message),
        from_agent: agent_id.to_string(),
        body: format!("cleared claims: {}", summary),
        mentions: vec![],
        kind: MessageKind::Agent,
        home: ROOM.to_string(),
        reply_to: None,
        quote: None,
        references: None,
        surface_source: None,
        stamp: Stamp::default(),
    };

    channel.commit(
        vec![
            LogRecord::ClaimClear(clear_record),
            LogRecord::Message(announce),
        ],
        vec![],
    )?;

    Ok(cleared)
}

pub fn list(channel: &Channel) -> Result<Vec<Claim>> {
    Ok(queries::claims::list(channel.db().conn())?)
}

pub fn list_for(channel: &Channel, agent_id: &str) -> Result<Vec<Claim>> {
    Ok(queries::claims::list_for(channel.db().conn(), agent_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_channel(temp: &TempDir) -> Channel {
        Channel::init(temp.path(), "test").unwrap()
    }

    #[test]
    fn test_claim_conflict_and_force() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        claim(&mut channel, "alice", ClaimType::File, "src/*.rs", false).unwrap();

        let denied = claim(&mut channel, "bob", ClaimType::File, "src/*.rs", false);
        assert!(matches!(denied, Err(Error::Conflict(_))));

        let taken = claim(&mut channel, "bob", ClaimType::File, "src/*.rs", true).unwrap();
        assert_eq!(taken.agent_id, "bob");
        assert_eq!(list(&channel).unwrap().len(), 1);
    }

    #[test]
    fn test_reclaim_own_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let first = claim(&mut channel, "alice", ClaimType::Bd, "bd-42", false).unwrap();
        let again = claim(&mut channel, "alice", ClaimType::Bd, "bd-42", false).unwrap();
        assert_eq!(first.claimed_at, again.claimed_at);
    }

    #[test]
    fn test_clear_all_announces_in_room() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        claim(&mut channel, "alice", ClaimType::File, "a.rs", false).unwrap();
        claim(&mut channel, "alice", ClaimType::Issue, "42", false).unwrap();

        let cleared = clear(&mut channel, "alice", None).unwrap();
        assert_eq!(cleared.len(), 2);
        assert!(list(&channel).unwrap().is_empty());

        let room = fray_index::queries::messages::list_home(channel.db().conn(), ROOM, 10).unwrap();
        assert_eq!(room.len(), 1);
        assert!(room[0].body.starts_with("cleared claims: "));
        assert!(room[0].body.contains("file:a.rs"));
    }

    #[test]
    fn test_clear_single_target() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        claim(&mut channel, "alice", ClaimType::File, "a.rs", false).unwrap();
        claim(&mut channel, "alice", ClaimType::File, "b.rs", false).unwrap();

        clear(&mut channel, "alice", Some((ClaimType::File, "a.rs"))).unwrap();
        let remaining = list(&channel).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].pattern, "b.rs");
    }

    #[test]
    fn test_clear_someone_elses_claim_conflicts() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        claim(&mut channel, "alice", ClaimType::File, "a.rs", false).unwrap();
        let result = clear(&mut channel, "bob", Some((ClaimType::File, "a.rs")));
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
