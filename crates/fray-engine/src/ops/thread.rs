use fray_index::queries;
use fray_types::{
    IdKind, LogRecord, MAX_THREAD_DEPTH, Stamp, Thread, ThreadRecord, ThreadSubscribeRecord,
    ThreadMessageRecord, ThreadStatus, ThreadUpdateRecord, new_id, now_ts,
};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::resolve;

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("thread names cannot be empty".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidInput(format!(
            "thread names cannot contain '/': {}",
            name
        )));
    }
    Ok(())
}

/// Create a thread, optionally under a parent resolved from any thread
/// token. Depth is checked before anything is written.
pub fn create(
    channel: &mut Channel,
    name: &str,
    parent_token: Option<&str>,
    kind: Option<&str>,
) -> Result<Thread> {
    validate_name(name)?;

    let parent_guid = match parent_token {
        Some(token) => Some(resolve::resolve_thread(channel.db().conn(), token)?),
        None => None,
    };

    if let Some(parent) = &parent_guid {
        let parent_depth = queries::threads::depth_of(channel.db().conn(), parent)?;
        if parent_depth + 1 > MAX_THREAD_DEPTH {
            return Err(Error::Conflict(format!(
                "thread depth limit is {} (parent is already at {})",
                MAX_THREAD_DEPTH, parent_depth
            )));
        }
    }

    let siblings =
        queries::threads::find_child_by_name(channel.db().conn(), parent_guid.as_deref(), name)?;
    if !siblings.is_empty() {
        return Err(Error::Conflict(format!(
            "a thread named '{}' already exists at that level",
            name
        )));
    }

    let record = ThreadRecord {
        id: new_id(IdKind::Thread),
        name: name.to_string(),
        parent_thread: parent_guid,
        kind: kind.map(|s| s.to_string()),
        anchor: None,
        anchor_hidden: false,
        created_at: now_ts(),
        stamp: Stamp::default(),
    };
    let guid = record.id.clone();

    channel.commit(vec![LogRecord::Thread(record)], vec![])?;
    get(channel, &guid)
}

/// Re-parent a thread. The walk up from the new parent rejects both cycles
/// and over-deep chains before any write happens.
pub fn move_thread(
    channel: &mut Channel,
    token: &str,
    new_parent_token: Option<&str>,
) -> Result<Thread> {
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;

    let new_parent = match new_parent_token {
        Some(parent_token) => Some(resolve::resolve_thread(channel.db().conn(), parent_token)?),
        None => None,
    };

    if let Some(parent) = &new_parent {
        if queries::threads::is_ancestor(channel.db().conn(), parent, &guid)? {
            return Err(Error::Conflict(
                "cannot move a thread under its own descendant".to_string(),
            ));
        }
        let parent_depth = queries::threads::depth_of(channel.db().conn(), parent)?;
        if parent_depth + 1 > MAX_THREAD_DEPTH {
            return Err(Error::Conflict(format!(
                "thread depth limit is {} (parent is already at {})",
                MAX_THREAD_DEPTH, parent_depth
            )));
        }
    }

    let record = ThreadUpdateRecord {
        id: guid.clone(),
        parent_thread: Some(new_parent.as_deref().map(|s| s.to_string())),
        ..ThreadUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::ThreadUpdate(record)], vec![])?;
    get(channel, &guid)
}

pub fn archive(channel: &mut Channel, token: &str) -> Result<Thread> {
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;

    let record = ThreadUpdateRecord {
        id: guid.clone(),
        status: Some(Some(ThreadStatus::Archived)),
        ..ThreadUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::ThreadUpdate(record)], vec![])?;
    get(channel, &guid)
}

pub fn rename(channel: &mut Channel, token: &str, new_name: &str) -> Result<Thread> {
    validate_name(new_name)?;
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;

    let record = ThreadUpdateRecord {
        id: guid.clone(),
        name: Some(Some(new_name.to_string())),
        ..ThreadUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::ThreadUpdate(record)], vec![])?;
    get(channel, &guid)
}

pub fn subscribe(channel: &mut Channel, token: &str, agent_id: &str) -> Result<()> {
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;
    let record = ThreadSubscribeRecord {
        thread_guid: guid,
        agent_id: agent_id.to_string(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::ThreadSubscribe(record)], vec![])?;
    Ok(())
}

pub fn unsubscribe(channel: &mut Channel, token: &str, agent_id: &str) -> Result<()> {
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;
    let record = ThreadSubscribeRecord {
        thread_guid: guid,
        agent_id: agent_id.to_string(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::ThreadUnsubscribe(record)], vec![])?;
    Ok(())
}

pub fn mute(channel: &mut Channel, token: &str, agent_id: &str) -> Result<()> {
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;
    let record = ThreadSubscribeRecord {
        thread_guid: guid,
        agent_id: agent_id.to_string(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::ThreadMute(record)], vec![])?;
    Ok(())
}

pub fn unmute(channel: &mut Channel, token: &str, agent_id: &str) -> Result<()> {
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;
    let record = ThreadSubscribeRecord {
        thread_guid: guid,
        agent_id: agent_id.to_string(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::ThreadUnmute(record)], vec![])?;
    Ok(())
}

/// Add a message to a thread's membership explicitly.
pub fn add_message(
    channel: &mut Channel,
    thread_token: &str,
    message_token: &str,
    added_by: &str,
) -> Result<()> {
    let thread_guid = resolve::resolve_thread(channel.db().conn(), thread_token)?;
    let message_guid = resolve::resolve_message(channel.db().conn(), message_token)?;

    let record = ThreadMessageRecord {
        thread_guid,
        message_guid,
        added_by: added_by.to_string(),
        added_at: now_ts(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::ThreadMessage(record)], vec![])?;
    Ok(())
}

pub fn remove_message(
    channel: &mut Channel,
    thread_token: &str,
    message_token: &str,
    removed_by: &str,
) -> Result<()> {
    let thread_guid = resolve::resolve_thread(channel.db().conn(), thread_token)?;
    let message_guid = resolve::resolve_message(channel.db().conn(), message_token)?;

    let record = ThreadMessageRecord {
        thread_guid,
        message_guid,
        added_by: removed_by.to_string(),
        added_at: now_ts(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::ThreadMessageRemove(record)], vec![])?;
    Ok(())
}

pub fn pin(channel: &mut Channel, thread_token: &str, message_token: &str, by: &str) -> Result<()> {
    let thread_guid = resolve::resolve_thread(channel.db().conn(), thread_token)?;
    let message_guid = resolve::resolve_message(channel.db().conn(), message_token)?;

    let record = fray_types::MessagePinRecord {
        thread_guid,
        message_guid,
        agent_id: by.to_string(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::MessagePin(record)], vec![])?;
    Ok(())
}

pub fn unpin(
    channel: &mut Channel,
    thread_token: &str,
    message_token: &str,
    by: &str,
) -> Result<()> {
    let thread_guid = resolve::resolve_thread(channel.db().conn(), thread_token)?;
    let message_guid = resolve::resolve_message(channel.db().conn(), message_token)?;

    let record = fray_types::MessagePinRecord {
        thread_guid,
        message_guid,
        agent_id: by.to_string(),
        stamp: Stamp::default(),
    };
    channel.commit(vec![LogRecord::MessageUnpin(record)], vec![])?;
    Ok(())
}

pub fn get(channel: &Channel, token: &str) -> Result<Thread> {
    let guid = resolve::resolve_thread(channel.db().conn(), token)?;
    queries::threads::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no thread {}", guid)))
}

pub fn list(channel: &Channel) -> Result<Vec<Thread>> {
    Ok(queries::threads::list(channel.db().conn())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_channel(temp: &TempDir) -> Channel {
        Channel::init(temp.path(), "test").unwrap()
    }

    #[test]
    fn test_depth_limit() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let mut parent: Option<String> = None;
        for name in ["a", "b", "c", "d"] {
            let thread = create(&mut channel, name, parent.as_deref(), None).unwrap();
            parent = Some(thread.guid);
        }

        let too_deep = create(&mut channel, "e", parent.as_deref(), None);
        assert!(matches!(too_deep, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_move_rejects_cycle() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let a = create(&mut channel, "a", None, None).unwrap();
        let b = create(&mut channel, "b", Some(&a.guid), None).unwrap();

        let result = move_thread(&mut channel, &a.guid, Some(&b.guid));
        assert!(matches!(result, Err(Error::Conflict(_))));

        let self_move = move_thread(&mut channel, &a.guid, Some(&a.guid));
        assert!(matches!(self_move, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_move_to_root() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let a = create(&mut channel, "a", None, None).unwrap();
        let b = create(&mut channel, "b", Some(&a.guid), None).unwrap();

        let moved = move_thread(&mut channel, &b.guid, None).unwrap();
        assert_eq!(moved.parent_thread, None);
    }

    #[test]
    fn test_name_validation() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        assert!(matches!(
            create(&mut channel, "", None, None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            create(&mut channel, "a/b", None, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_archive() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let thread = create(&mut channel, "done-soon", None, Some("knowledge")).unwrap();
        assert_eq!(thread.kind, Some("knowledge".to_string()));

        let archived = archive(&mut channel, "done-soon").unwrap();
        assert_eq!(archived.status, ThreadStatus::Archived);
    }

    #[test]
    fn test_duplicate_sibling_name_conflicts() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        create(&mut channel, "notes", None, None).unwrap();
        assert!(matches!(
            create(&mut channel, "notes", None, None),
            Err(Error::Conflict(_))
        ));
    }
}
