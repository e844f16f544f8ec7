use fray_core::base_of;
use fray_index::queries;
use fray_types::{
    IdKind, LogRecord, Message, MessageKind, MessageRecord, MessageUpdateRecord, Reaction,
    ReactionRecord, ROOM, Stamp, ThreadMessageRecord, ThreadSubscribeRecord, extract_mention_tokens,
    is_single_emoji, new_id, now_ts, short_prefix,
};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::resolve;

pub struct PostParams {
    pub from_agent: String,
    pub body: String,
    /// True when the identity came from the agent environment rather than a
    /// human-typed `--as`.
    pub as_agent: bool,
    pub thread_token: Option<String>,
    pub reply_to_token: Option<String>,
    pub quote_token: Option<String>,
    /// Mark the question answered by this reply.
    pub answer_token: Option<String>,
}

/// What a `post` actually did: a single-emoji reply collapses to a reaction.
pub enum PostOutcome {
    Posted(Message),
    Reacted(Reaction),
}

/// Post a message. Mentions are the `@name` tokens that name known agents;
/// `@all` expands to every present agent except the poster. Posting into a
/// thread subscribes the poster and everyone mentioned; a reply to a message
/// living elsewhere pulls that message into this thread's membership
/// (never moving it).
pub fn post(channel: &mut Channel, params: PostParams) -> Result<PostOutcome> {
    let body = params.body.trim_end().to_string();
    if body.trim().is_empty() {
        return Err(Error::InvalidInput("message body cannot be empty".to_string()));
    }

    let reply_to = match &params.reply_to_token {
        Some(token) => Some(resolve::resolve_message(channel.db().conn(), token)?),
        None => None,
    };

    // A bare emoji replying to something is a reaction, not a message
    if let Some(target) = &reply_to
        && is_single_emoji(&body)
    {
        let reaction = react(channel, &params.from_agent, target, body.trim())?;
        return Ok(PostOutcome::Reacted(reaction));
    }

    let home = match &params.thread_token {
        Some(token) => resolve::resolve_thread(channel.db().conn(), token)?,
        None => ROOM.to_string(),
    };
    let quote = match &params.quote_token {
        Some(token) => Some(resolve::resolve_message(channel.db().conn(), token)?),
        None => None,
    };

    let mentions = expand_mentions(channel, &body, &params.from_agent)?;
    let kind = if params.as_agent {
        MessageKind::Agent
    } else {
        MessageKind::User
    };

    let message_guid = new_id(IdKind::Message);
    let mut records = vec![LogRecord::Message(MessageRecord {
        id: message_guid.clone(),
        from_agent: params.from_agent.clone(),
        body,
        mentions: mentions.clone(),
        kind,
        home: home.clone(),
        reply_to: reply_to.clone(),
        quote,
        references: None,
        surface_source: None,
        stamp: Stamp::default(),
    })];

    if home != ROOM {
        // Implicit subscriptions for the poster and everyone mentioned
        let mut subscribers = vec![params.from_agent.clone()];
        subscribers.extend(mentions.iter().cloned());
        for agent_id in subscribers {
            let already = subscription_exists(channel, &home, &agent_id)?;
            if !already {
                records.push(LogRecord::ThreadSubscribe(ThreadSubscribeRecord {
                    thread_guid: home.clone(),
                    agent_id,
                    stamp: Stamp::default(),
                }));
            }
        }

        // A cross-thread reply adds the parent here; its own home is untouched
        if let Some(parent_guid) = &reply_to
            && let Some(parent) = queries::messages::get(channel.db().conn(), parent_guid)?
            && parent.home != home
            && !queries::threads::has_message(channel.db().conn(), &home, parent_guid)?
        {
            records.push(LogRecord::ThreadMessage(ThreadMessageRecord {
                thread_guid: home.clone(),
                message_guid: parent_guid.clone(),
                added_by: params.from_agent.clone(),
                added_at: now_ts(),
                stamp: Stamp::default(),
            }));
        }
    }

    channel.commit(records, vec![])?;

    if let Some(question_token) = &params.answer_token {
        crate::ops::question::answer(channel, question_token, &message_guid)?;
    }

    let message = queries::messages::get(channel.db().conn(), &message_guid)?
        .ok_or_else(|| Error::NotFound(format!("message {} missing after commit", message_guid)))?;
    Ok(PostOutcome::Posted(message))
}

fn subscription_exists(channel: &Channel, thread_guid: &str, agent_id: &str) -> Result<bool> {
    Ok(queries::threads::subscribers(channel.db().conn(), thread_guid)?
        .iter()
        .any(|s| s == agent_id))
}

/// `@name` tokens intersected with the known-agent set. `@all` expands to
/// every present agent except the poster; the poster's own base never
/// mentions itself.
fn expand_mentions(channel: &Channel, body: &str, from_agent: &str) -> Result<Vec<String>> {
    let tokens = extract_mention_tokens(body);
    let poster_base = base_of(from_agent).to_string();
    let mut mentions: Vec<String> = Vec::new();

    for token in tokens {
        if token == "all" {
            for agent in queries::agents::list_present(channel.db().conn())? {
                let base = base_of(&agent.agent_id).to_string();
                if base != poster_base && !mentions.contains(&base) {
                    mentions.push(base);
                }
            }
            continue;
        }
        let base = base_of(&token).to_string();
        if base == poster_base {
            continue;
        }
        if queries::agents::get_by_agent_id_ci(channel.db().conn(), &base)?
            .into_iter()
            .next()
            .is_some()
            && !mentions.contains(&base)
        {
            mentions.push(base);
        }
    }
    Ok(mentions)
}

pub struct EditParams {
    pub token: String,
    pub new_body: String,
    pub reason: Option<String>,
    pub from_agent: String,
}

/// Edit a message body. Every caller is a registered agent, so the
/// edit-reason invariant is unconditional; the edit is announced with an
/// event message in the room referencing the original.
pub fn edit(channel: &mut Channel, params: EditParams) -> Result<Message> {
    let reason = match params.reason.as_deref().map(str::trim) {
        Some(reason) if !reason.is_empty() => reason.to_string(),
        _ => {
            return Err(Error::InvalidInput(
                "edits require a reason (-m \"why\")".to_string(),
            ));
        }
    };

    let guid = resolve::resolve_message(channel.db().conn(), &params.token)?;
    let now = now_ts();

    let update = MessageUpdateRecord {
        id: guid.clone(),
        body: Some(Some(params.new_body.clone())),
        edited_at: Some(Some(now)),
        reason: Some(reason.clone()),
        ..MessageUpdateRecord::default()
    };

    let event_body = format!("edited #{}: {}", short_prefix(&guid), reason);
    let event = MessageRecord {
        id: new_id(IdKind::Message),
        from_agent: params.from_agent,
        body: event_body,
        mentions: vec![],
        kind: MessageKind::Event,
        home: ROOM.to_string(),
        reply_to: None,
        quote: None,
        references: Some(guid.clone()),
        surface_source: None,
        stamp: Stamp::default(),
    };

    channel.commit(
        vec![
            LogRecord::MessageUpdate(update),
            LogRecord::Message(event),
        ],
        vec![],
    )?;

    queries::messages::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no message {}", guid)))
}

/// Add a reaction; idempotent per (message, agent, emoji).
pub fn react(channel: &mut Channel, from_agent: &str, token: &str, emoji: &str) -> Result<Reaction> {
    let guid = resolve::resolve_message(channel.db().conn(), token)?;
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(Error::InvalidInput("reaction emoji cannot be empty".to_string()));
    }

    let reaction = Reaction {
        message_guid: guid.clone(),
        from_agent: from_agent.to_string(),
        reaction: emoji.to_string(),
        reacted_at: now_ts(),
    };

    let already = queries::reactions::list_for_message(channel.db().conn(), &guid)?
        .iter()
        .any(|r| r.from_agent == from_agent && r.reaction == emoji);
    if already {
        return Ok(reaction);
    }

    channel.commit(
        vec![LogRecord::Reaction(ReactionRecord {
            message_guid: guid,
            from_agent: reaction.from_agent.clone(),
            reaction: reaction.reaction.clone(),
            reacted_at: reaction.reacted_at,
            stamp: Stamp::default(),
        })],
        vec![],
    )?;
    Ok(reaction)
}

/// Surface a message into the room: a new top-level `surface` message
/// referencing the original, plus (when the original lives in a thread) an
/// event in that thread pointing back at it.
pub fn surface(channel: &mut Channel, from_agent: &str, token: &str) -> Result<Message> {
    let guid = resolve::resolve_message(channel.db().conn(), token)?;
    let original = queries::messages::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no message {}", guid)))?;

    let surface_guid = new_id(IdKind::Message);
    let mut records = vec![LogRecord::Message(MessageRecord {
        id: surface_guid.clone(),
        from_agent: from_agent.to_string(),
        body: original.body.clone(),
        mentions: vec![],
        kind: MessageKind::Surface,
        home: ROOM.to_string(),
        reply_to: None,
        quote: None,
        references: Some(guid.clone()),
        surface_source: Some(original.home.clone()),
        stamp: Stamp::default(),
    })];

    if original.home != ROOM {
        records.push(LogRecord::Message(MessageRecord {
            id: new_id(IdKind::Message),
            from_agent: from_agent.to_string(),
            body: format!("surfaced #{} to room", short_prefix(&guid)),
            mentions: vec![],
            kind: MessageKind::Event,
            home: original.home.clone(),
            reply_to: None,
            quote: None,
            references: Some(guid.clone()),
            surface_source: None,
            stamp: Stamp::default(),
        }));
    }

    channel.commit(records, vec![])?;

    queries::messages::get(channel.db().conn(), &surface_guid)?
        .ok_or_else(|| Error::NotFound(format!("message {} missing after commit", surface_guid)))
}

/// Archive (tombstone) a message; the log record remains.
pub fn archive(channel: &mut Channel, token: &str) -> Result<Message> {
    let guid = resolve::resolve_message(channel.db().conn(), token)?;
    let record = MessageUpdateRecord {
        id: guid.clone(),
        archived_at: Some(Some(now_ts())),
        ..MessageUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::MessageUpdate(record)], vec![])?;
    queries::messages::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no message {}", guid)))
}

pub fn get(channel: &Channel, token: &str) -> Result<Message> {
    let guid = resolve::resolve_message(channel.db().conn(), token)?;
    queries::messages::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no message {}", guid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::agent::{self, JoinParams};
    use crate::ops::thread;
    use tempfile::TempDir;

    fn open_channel(temp: &TempDir) -> Channel {
        let mut channel = Channel::init(temp.path(), "test").unwrap();
        for name in ["alice", "bob", "carol"] {
            agent::join(
                &mut channel,
                JoinParams {
                    agent_id: name.to_string(),
                    goal: None,
                    bio: None,
                    managed: false,
                    invoke: None,
                    avatar: None,
                },
            )
            .unwrap();
        }
        channel
    }

    fn simple_post(channel: &mut Channel, from: &str, body: &str) -> Message {
        match post(
            channel,
            PostParams {
                from_agent: from.to_string(),
                body: body.to_string(),
                as_agent: true,
                thread_token: None,
                reply_to_token: None,
                quote_token: None,
                answer_token: None,
            },
        )
        .unwrap()
        {
            PostOutcome::Posted(message) => message,
            PostOutcome::Reacted(_) => panic!("expected a post"),
        }
    }

    #[test]
    fn test_post_extracts_known_mentions_only() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let message = simple_post(&mut channel, "alice", "hi @bob and @stranger");
        assert_eq!(message.mentions, vec!["bob"]);
    }

    #[test]
    fn test_all_expands_without_poster() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);

        let message = simple_post(&mut channel, "alice", "@all standup time");
        assert_eq!(message.mentions, vec!["bob", "carol"]);
    }

    #[test]
    fn test_thread_post_subscribes_poster_and_mentioned() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        let analysis = thread::create(&mut channel, "analysis", None, None).unwrap();

        post(
            &mut channel,
            PostParams {
                from_agent: "alice".to_string(),
                body: "digging in with @bob".to_string(),
                as_agent: true,
                thread_token: Some("analysis".to_string()),
                reply_to_token: None,
                quote_token: None,
                answer_token: None,
            },
        )
        .unwrap();

        let subs =
            queries::threads::subscribers(channel.db().conn(), &analysis.guid).unwrap();
        assert_eq!(subs, vec!["alice", "bob"]);
    }

    #[test]
    fn test_cross_thread_reply_adds_parent_membership() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        let analysis = thread::create(&mut channel, "analysis", None, None).unwrap();

        let room_message = simple_post(&mut channel, "alice", "room msg");

        post(
            &mut channel,
            PostParams {
                from_agent: "alice".to_string(),
                body: "following up".to_string(),
                as_agent: true,
                thread_token: Some("analysis".to_string()),
                reply_to_token: Some(room_message.guid.clone()),
                quote_token: None,
                answer_token: None,
            },
        )
        .unwrap();

        assert!(queries::threads::has_message(
            channel.db().conn(),
            &analysis.guid,
            &room_message.guid
        )
        .unwrap());
        // The parent itself was not moved
        let parent = get(&channel, &room_message.guid).unwrap();
        assert_eq!(parent.home, ROOM);
    }

    #[test]
    fn test_single_emoji_reply_is_reaction() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        let target = simple_post(&mut channel, "alice", "shipped!");

        let outcome = post(
            &mut channel,
            PostParams {
                from_agent: "bob".to_string(),
                body: "👍".to_string(),
                as_agent: true,
                thread_token: None,
                reply_to_token: Some(target.guid.clone()),
                quote_token: None,
                answer_token: None,
            },
        )
        .unwrap();

        match outcome {
            PostOutcome::Reacted(reaction) => {
                assert_eq!(reaction.message_guid, target.guid);
                assert_eq!(reaction.reaction, "👍");
            }
            PostOutcome::Posted(_) => panic!("expected a reaction"),
        }

        let reactions =
            queries::reactions::list_for_message(channel.db().conn(), &target.guid).unwrap();
        assert_eq!(reactions.len(), 1);
    }

    #[test]
    fn test_agent_edit_requires_reason() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        let message = simple_post(&mut channel, "alice", "ping");

        let denied = edit(
            &mut channel,
            EditParams {
                token: message.guid.clone(),
                new_body: "pong".to_string(),
                reason: None,
                from_agent: "alice".to_string(),
            },
        );
        assert!(matches!(denied, Err(Error::InvalidInput(_))));

        let edited = edit(
            &mut channel,
            EditParams {
                token: message.guid.clone(),
                new_body: "pong".to_string(),
                reason: Some("fix typo".to_string()),
                from_agent: "alice".to_string(),
            },
        )
        .unwrap();
        assert_eq!(edited.body, "pong");
        assert!(edited.edited_at.is_some());

        // The edit event landed in room, references the original, and names
        // the reason
        let room = queries::messages::list_home(channel.db().conn(), ROOM, 10).unwrap();
        let event = room
            .iter()
            .find(|m| m.kind == MessageKind::Event)
            .expect("edit event posted");
        assert!(event.body.starts_with("edited #"));
        assert!(event.body.contains("fix typo"));
        assert_eq!(event.references, Some(message.guid.clone()));
    }

    #[test]
    fn test_surface_from_thread_adds_pointer_event() {
        let temp = TempDir::new().unwrap();
        let mut channel = open_channel(&temp);
        let analysis = thread::create(&mut channel, "analysis", None, None).unwrap();

        let original = match post(
            &mut channel,
            PostParams {
                from_agent: "alice".to_string(),
                body: "key insight".to_string(),
                as_agent: true,
                thread_token: Some("analysis".to_string()),
                reply_to_token: None,
                quote_token: None,
                answer_token: None,
            },
        )
        .unwrap()
        {
            PostOutcome::Posted(message) => message,
            _ => unreachable!(),
        };

        let surfaced = surface(&mut channel, "bob", &original.guid).unwrap();
        assert_eq!(surfaced.home, ROOM);
        assert_eq!(surfaced.kind, MessageKind::Surface);
        assert_eq!(surfaced.references, Some(original.guid.clone()));
        assert_eq!(surfaced.surface_source, Some(analysis.guid.clone()));

        let in_thread =
            queries::messages::list_home(channel.db().conn(), &analysis.guid, 10).unwrap();
        let event = in_thread
            .iter()
            .find(|m| m.kind == MessageKind::Event)
            .expect("pointer event in thread");
        assert_eq!(event.references, Some(original.guid.clone()));
    }
}
