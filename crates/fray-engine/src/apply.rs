use fray_index::queries;
use fray_types::{
    Agent, GhostCursor, LogRecord, Message, Presence, Question, Reaction, Thread, ThreadStatus,
};
use rusqlite::Connection;

use crate::error::Result;

/// Outcome of applying a single record to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A create record for a GUID that already exists. Harmless when the
    /// payload matches (replayed record); a collision otherwise.
    DuplicateCreate,
}

// NOTE: Single Apply Path
//
// Live operations and the rebuild both funnel every cache mutation through
// apply_record. That is what makes "rebuild from logs" and "state after the
// ops ran" the same cache by construction: there is no second copy of the
// fold logic to drift.

/// Apply one log record to the cache. Records are self-contained; ordering
/// across records is the caller's responsibility (live ops apply in issue
/// order, rebuild applies in canonical (ts, origin, seq) order).
pub fn apply_record(conn: &Connection, record: &LogRecord) -> Result<ApplyOutcome> {
    match record {
        LogRecord::Message(r) => {
            if queries::messages::exists(conn, &r.id)? {
                return Ok(ApplyOutcome::DuplicateCreate);
            }
            let message = Message {
                guid: r.id.clone(),
                ts: r.stamp.ts,
                from_agent: r.from_agent.clone(),
                body: r.body.clone(),
                mentions: r.mentions.clone(),
                kind: r.kind,
                home: r.home.clone(),
                reply_to: r.reply_to.clone(),
                quote: r.quote.clone(),
                references: r.references.clone(),
                surface_source: r.surface_source.clone(),
                edited_at: None,
                archived_at: None,
                origin: r.stamp.origin.clone(),
            };
            queries::messages::insert(conn, &message, r.stamp.seq)?;

            // A message's home implies membership in that thread
            if message.home != fray_types::ROOM && !message.home.is_empty() {
                queries::threads::add_message(
                    conn,
                    &message.home,
                    &message.guid,
                    &message.from_agent,
                    message.ts,
                )?;
            }
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::MessageUpdate(r) => {
            queries::messages::apply_update(
                conn,
                &r.id,
                &queries::messages::MessagePatch {
                    body: r.body.as_ref().map(|inner| inner.as_deref()),
                    edited_at: r.edited_at,
                    archived_at: r.archived_at,
                },
            )?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::Agent(r) => {
            if queries::agents::get_by_guid(conn, &r.id)?.is_some() {
                return Ok(ApplyOutcome::DuplicateCreate);
            }
            // agent_id is unique too: a create for a taken handle is a
            // collision at the handle level
            if queries::agents::get_by_agent_id(conn, &r.agent_id)?.is_some() {
                return Ok(ApplyOutcome::DuplicateCreate);
            }
            let agent = Agent {
                guid: r.id.clone(),
                agent_id: r.agent_id.clone(),
                goal: r.goal.clone(),
                bio: r.bio.clone(),
                presence: Presence::Offline,
                status: None,
                last_seen: r.last_seen,
                left_at: None,
                managed: r.managed,
                invoke: r.invoke.clone(),
                mention_watermark: None,
                identity_guid: r.identity_guid.clone(),
                avatar: r.avatar.clone(),
                registered_at: r.registered_at,
            };
            queries::agents::insert(conn, &agent)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::AgentUpdate(r) => {
            queries::agents::apply_update(
                conn,
                &r.id,
                &queries::agents::AgentPatch {
                    goal: r.goal.as_ref().map(|inner| inner.as_deref()),
                    bio: r.bio.as_ref().map(|inner| inner.as_deref()),
                    presence: r.presence.and_then(|inner| inner),
                    status: r.status.as_ref().map(|inner| inner.as_deref()),
                    last_seen: r.last_seen,
                    left_at: r.left_at,
                    invoke: r.invoke.as_ref().map(|inner| inner.as_ref()),
                    mention_watermark: r.mention_watermark.as_ref().map(|inner| inner.as_deref()),
                    avatar: r.avatar.as_ref().map(|inner| inner.as_deref()),
                },
            )?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::Thread(r) => {
            if queries::threads::get(conn, &r.id)?.is_some() {
                return Ok(ApplyOutcome::DuplicateCreate);
            }
            let thread = Thread {
                guid: r.id.clone(),
                name: r.name.clone(),
                parent_thread: r.parent_thread.clone(),
                status: ThreadStatus::Open,
                kind: r.kind.clone(),
                anchor: r.anchor.clone(),
                anchor_hidden: r.anchor_hidden,
                created_at: r.created_at,
            };
            queries::threads::insert(conn, &thread)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::ThreadUpdate(r) => {
            queries::threads::apply_update(
                conn,
                &r.id,
                &queries::threads::ThreadPatch {
                    name: r.name.as_ref().and_then(|inner| inner.as_deref()),
                    parent_thread: r.parent_thread.as_ref().map(|inner| inner.as_deref()),
                    status: r.status.and_then(|inner| inner),
                    anchor: r.anchor.as_ref().map(|inner| inner.as_deref()),
                    anchor_hidden: r.anchor_hidden.and_then(|inner| inner),
                },
            )?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::ThreadSubscribe(r) => {
            queries::threads::subscribe(conn, &r.thread_guid, &r.agent_id)?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::ThreadUnsubscribe(r) => {
            queries::threads::unsubscribe(conn, &r.thread_guid, &r.agent_id)?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::ThreadMute(r) => {
            queries::threads::set_muted(conn, &r.thread_guid, &r.agent_id, true)?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::ThreadUnmute(r) => {
            queries::threads::set_muted(conn, &r.thread_guid, &r.agent_id, false)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::ThreadMessage(r) => {
            queries::threads::add_message(
                conn,
                &r.thread_guid,
                &r.message_guid,
                &r.added_by,
                r.added_at,
            )?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::ThreadMessageRemove(r) => {
            queries::threads::remove_message(conn, &r.thread_guid, &r.message_guid)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::MessagePin(r) => {
            queries::threads::pin_message(
                conn,
                &r.thread_guid,
                &r.message_guid,
                &r.agent_id,
                r.stamp.ts,
            )?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::MessageUnpin(r) => {
            queries::threads::unpin_message(conn, &r.thread_guid, &r.message_guid)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::Question(r) => {
            if queries::questions::get(conn, &r.id)?.is_some() {
                return Ok(ApplyOutcome::DuplicateCreate);
            }
            let question = Question {
                guid: r.id.clone(),
                re: r.re.clone(),
                from_agent: r.from_agent.clone(),
                to_agent: r.to_agent.clone(),
                status: r.status,
                thread: r.thread.clone(),
                asked_in: r.asked_in.clone(),
                answered_in: None,
                created_at: r.created_at,
                options: r.options.clone(),
            };
            queries::questions::insert(conn, &question)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::QuestionUpdate(r) => {
            queries::questions::apply_update(
                conn,
                &r.id,
                &queries::questions::QuestionPatch {
                    status: r.status.and_then(|inner| inner),
                    to_agent: r.to_agent.as_ref().map(|inner| inner.as_deref()),
                    asked_in: r.asked_in.as_ref().map(|inner| inner.as_deref()),
                    answered_in: r.answered_in.as_ref().map(|inner| inner.as_deref()),
                },
            )?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::Reaction(r) => {
            let reaction = Reaction {
                message_guid: r.message_guid.clone(),
                from_agent: r.from_agent.clone(),
                reaction: r.reaction.clone(),
                reacted_at: r.reacted_at,
            };
            queries::reactions::upsert(conn, &reaction)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::Claim(r) => {
            let claim = fray_types::Claim {
                claim_type: r.claim_type,
                pattern: r.pattern.clone(),
                agent_id: r.agent_id.clone(),
                claimed_at: r.claimed_at,
            };
            queries::claims::upsert(conn, &claim)?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::ClaimClear(r) => {
            match (&r.claim_type, &r.pattern) {
                (Some(claim_type), Some(pattern)) => {
                    queries::claims::remove(conn, *claim_type, pattern)?;
                }
                _ => {
                    queries::claims::remove_all_for(conn, &r.agent_id)?;
                }
            }
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::SessionStart(r) => {
            queries::sessions::record_start(
                conn,
                &r.session_id,
                &r.agent_id,
                r.started_at,
                r.triggered_by.as_deref(),
            )?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::SessionEnd(r) => {
            queries::sessions::record_end(conn, &r.session_id, r.ended_at, &r.reason)?;
            Ok(ApplyOutcome::Applied)
        }

        LogRecord::GhostCursor(r) => {
            queries::read_state::upsert_ghost_cursor(
                conn,
                &GhostCursor {
                    agent_id: r.agent_id.clone(),
                    home: r.home.clone(),
                    message_guid: r.message_guid.clone(),
                    assigned_at: r.assigned_at,
                    session_ack: None,
                },
            )?;
            Ok(ApplyOutcome::Applied)
        }
        LogRecord::GhostCursorAck(r) => {
            queries::read_state::ack_ghost_cursor(conn, &r.agent_id, &r.home, r.acked_at)?;
            Ok(ApplyOutcome::Applied)
        }

        // Hook installs have no cache projection
        LogRecord::HookInstall(_) => Ok(ApplyOutcome::Applied),
    }
}

/// Best-effort preview of a record body for the collision log.
pub fn collision_preview(record: &LogRecord) -> String {
    let body = match record {
        LogRecord::Message(r) => r.body.clone(),
        LogRecord::Agent(r) => r.agent_id.clone(),
        LogRecord::Thread(r) => r.name.clone(),
        LogRecord::Question(r) => r.re.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    body.chars().take(80).collect()
}

/// GUID of a create record, if this is one. Updates and relations return
/// `None`: collisions are only meaningful for creates.
pub fn create_guid(record: &LogRecord) -> Option<&str> {
    match record {
        LogRecord::Message(r) => Some(&r.id),
        LogRecord::Agent(r) => Some(&r.id),
        LogRecord::Thread(r) => Some(&r.id),
        LogRecord::Question(r) => Some(&r.id),
        _ => None,
    }
}
