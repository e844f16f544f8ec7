use fray_core::base_of;
use fray_index::queries;
use fray_types::{GhostCursorAckRecord, LogRecord, Message, ReadTo, ROOM, Stamp, now_ts};

use crate::channel::Channel;
use crate::error::Result;

/// Which boundary the unread computation used, reported so display code can
/// ack the right thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadBoundary {
    GhostCursor,
    ReadTo,
    /// No cursor at all: everything undelivered was returned.
    UnreadOnly,
}

#[derive(Debug)]
pub struct UnreadMentions {
    pub messages: Vec<Message>,
    pub boundary: UnreadBoundary,
}

/// Compute the unread mentions for an agent without touching any state.
pub fn peek_unread_mentions(channel: &Channel, agent_id: &str) -> Result<UnreadMentions> {
    let base = base_of(agent_id).to_string();
    let conn = channel.db().conn();

    let mut boundary = UnreadBoundary::UnreadOnly;
    let mut after: Option<(i64, i64)> = None;

    let ghost = queries::read_state::get_ghost_cursor(conn, &base, ROOM)?;
    let live_ghost = match &ghost {
        Some(cursor) if cursor.session_ack.is_none() && !ghost_expired(channel, cursor)? => {
            Some(cursor)
        }
        _ => None,
    };

    if let Some(cursor) = live_ghost {
        boundary = UnreadBoundary::GhostCursor;
        after = boundary_of(channel, &cursor.message_guid, cursor.assigned_at)?;
    } else if let Some(read_to) = queries::read_state::get_read_to(conn, &base, ROOM)? {
        boundary = UnreadBoundary::ReadTo;
        after = boundary_of(channel, &read_to.message_guid, read_to.ts)?;
    }

    let mut messages = queries::messages::mentions_after(conn, &base, after)?;
    // A message never notifies its own author's base
    messages.retain(|m| base_of(&m.from_agent) != base);

    Ok(UnreadMentions { messages, boundary })
}

/// Compute unread mentions and mark them delivered: advance `read_to` to the
/// newest listed message and, when the ghost cursor supplied the boundary,
/// ack it (idempotently).
pub fn take_unread_mentions(channel: &mut Channel, agent_id: &str) -> Result<UnreadMentions> {
    let unread = peek_unread_mentions(channel, agent_id)?;
    let base = base_of(agent_id).to_string();
    let now = now_ts();

    if let Some(newest) = unread.messages.last() {
        queries::read_state::upsert_read_to(
            channel.db().conn(),
            &ReadTo {
                agent_id: base.clone(),
                home: ROOM.to_string(),
                message_guid: newest.guid.clone(),
                ts: newest.ts,
                set_at: now,
            },
        )?;
    }

    if unread.boundary == UnreadBoundary::GhostCursor {
        channel.commit(
            vec![],
            vec![LogRecord::GhostCursorAck(GhostCursorAckRecord {
                agent_id: base,
                home: ROOM.to_string(),
                acked_at: now,
                stamp: Stamp::default(),
            })],
        )?;
    }

    Ok(unread)
}

/// The (ts, seq) pair of the boundary message, inclusive of records strictly
/// after it. A vanished boundary message falls back to its recorded
/// timestamp with a max sequence, so same-timestamp messages stay read.
fn boundary_of(
    channel: &Channel,
    message_guid: &str,
    fallback_ts: i64,
) -> Result<Option<(i64, i64)>> {
    match queries::messages::ts_and_seq(channel.db().conn(), message_guid)? {
        Some(pair) => Ok(Some(pair)),
        None => Ok(Some((fallback_ts, i64::MAX))),
    }
}

/// An unacked ghost cursor is treated as consumed once a supervision session
/// for the agent has started and ended after the assignment.
fn ghost_expired(channel: &Channel, cursor: &fray_types::GhostCursor) -> Result<bool> {
    let ended = queries::sessions::list_ended_for(channel.db().conn(), &cursor.agent_id)?;
    Ok(ended.iter().any(|s| s.started_at > cursor.assigned_at))
}
