//! End-to-end invariants over the engine: rebuilds reproduce the live
//! cache, local read state survives, and the notification flow delivers
//! each mention exactly once.

use fray_engine::{Channel, ops, peek_unread_mentions, take_unread_mentions};
use fray_index::queries;
use fray_types::QuestionStatus;
use tempfile::TempDir;

fn join(channel: &mut Channel, name: &str) {
    ops::agent::join(
        channel,
        ops::agent::JoinParams {
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

fn post(channel: &mut Channel, from: &str, body: &str) -> fray_types::Message {
    match ops::message::post(
        channel,
        ops::message::PostParams {
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
        ops::message::PostOutcome::Posted(message) => message,
        _ => panic!("expected post"),
    }
}

/// Dump every derived table as sorted rows of text for comparison.
fn cache_fingerprint(channel: &Channel) -> Vec<String> {
    let conn = channel.db().conn();
    let mut rows = Vec::new();

    for agent in queries::agents::list(conn).unwrap() {
        rows.push(format!("agent {} {} {:?}", agent.guid, agent.agent_id, agent.goal));
    }
    let mut stmt = conn
        .prepare("SELECT guid, ts, from_agent, body, home, kind FROM messages ORDER BY guid")
        .unwrap();
    let messages = stmt
        .query_map([], |row| {
            Ok(format!(
                "message {} {} {} {} {} {}",
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows.extend(messages);

    for question in queries::questions::list(conn).unwrap() {
        rows.push(format!(
            "question {} {} {} {:?}",
            question.guid,
            question.re,
            question.status.as_str(),
            question.answered_in
        ));
    }
    for claim in queries::claims::list(conn).unwrap() {
        rows.push(format!(
            "claim {} {} {}",
            claim.claim_type.as_str(),
            claim.pattern,
            claim.agent_id
        ));
    }

    rows.sort();
    rows
}

fn scripted_channel(temp: &TempDir) -> Channel {
    let mut channel = Channel::init(temp.path(), "equiv").unwrap();
    join(&mut channel, "alice");
    join(&mut channel, "bob");

    let hello = post(&mut channel, "alice", "hi @bob");
    post(&mut channel, "bob", "hey back");

    ops::thread::create(&mut channel, "analysis", None, None).unwrap();
    ops::message::post(
        &mut channel,
        ops::message::PostParams {
            from_agent: "alice".to_string(),
            body: "moving here".to_string(),
            as_agent: true,
            thread_token: Some("analysis".to_string()),
            reply_to_token: Some(hello.guid.clone()),
            quote_token: None,
            answer_token: None,
        },
    )
    .unwrap();

    let question = ops::question::ask(
        &mut channel,
        ops::question::AskParams {
            text: "target?".to_string(),
            from_agent: "alice".to_string(),
            to_agent: Some("bob".to_string()),
            thread_token: None,
            options: vec![],
        },
    )
    .unwrap();
    let answer_message = post(&mut channel, "bob", "B2B");
    ops::question::answer(&mut channel, &question.guid, &answer_message.guid).unwrap();

    ops::claim::claim(
        &mut channel,
        "alice",
        fray_types::ClaimType::File,
        "src/*.rs",
        false,
    )
    .unwrap();

    channel
}

#[test]
fn test_rebuild_matches_live_cache() {
    let temp = TempDir::new().unwrap();
    let mut channel = scripted_channel(&temp);

    let live = cache_fingerprint(&channel);
    channel.rebuild(|_| {}).unwrap();
    let rebuilt = cache_fingerprint(&channel);
    assert_eq!(live, rebuilt);

    // Determinism: a second rebuild is bit-identical again
    channel.rebuild(|_| {}).unwrap();
    assert_eq!(rebuilt, cache_fingerprint(&channel));
}

#[test]
fn test_rebuild_preserves_read_state() {
    let temp = TempDir::new().unwrap();
    let mut channel = scripted_channel(&temp);

    take_unread_mentions(&mut channel, "bob").unwrap();
    let before = queries::read_state::list_read_to(channel.db().conn()).unwrap();
    assert!(!before.is_empty());

    channel.rebuild(|_| {}).unwrap();
    let after = queries::read_state::list_read_to(channel.db().conn()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_notifs_deliver_exactly_once() {
    let temp = TempDir::new().unwrap();
    let mut channel = Channel::init(temp.path(), "notifs").unwrap();
    join(&mut channel, "alice");
    join(&mut channel, "bob");

    post(&mut channel, "alice", "hi @bob");

    let first = take_unread_mentions(&mut channel, "bob").unwrap();
    assert_eq!(first.messages.len(), 1);
    assert_eq!(first.messages[0].body, "hi @bob");

    let second = take_unread_mentions(&mut channel, "bob").unwrap();
    assert_eq!(second.messages.len(), 0);
}

#[test]
fn test_self_mentions_never_notify() {
    let temp = TempDir::new().unwrap();
    let mut channel = Channel::init(temp.path(), "selfref").unwrap();
    join(&mut channel, "alice");

    post(&mut channel, "alice", "note to self @alice");

    let unread = peek_unread_mentions(&channel, "alice").unwrap();
    assert!(unread.messages.is_empty());
}

#[test]
fn test_body_clear_tri_state_survives_rebuild() {
    let temp = TempDir::new().unwrap();
    let mut channel = Channel::init(temp.path(), "tristate").unwrap();
    join(&mut channel, "alice");

    let message = post(&mut channel, "alice", "soon to be redacted");

    // A null body on the update record is a clear, not "unchanged"
    channel
        .commit(
            vec![fray_types::LogRecord::MessageUpdate(
                fray_types::MessageUpdateRecord {
                    id: message.guid.clone(),
                    body: Some(None),
                    edited_at: Some(Some(fray_types::now_ts())),
                    reason: Some("redacted".to_string()),
                    ..fray_types::MessageUpdateRecord::default()
                },
            )],
            vec![],
        )
        .unwrap();

    let cleared = queries::messages::get(channel.db().conn(), &message.guid)
        .unwrap()
        .unwrap();
    assert_eq!(cleared.body, "");
    assert!(cleared.edited_at.is_some());

    // The clear is a log record like any other: replaying it reproduces
    // the cleared body, it does not resurrect the original
    channel.rebuild(|_| {}).unwrap();
    let replayed = queries::messages::get(channel.db().conn(), &message.guid)
        .unwrap()
        .unwrap();
    assert_eq!(replayed.body, "");
}

#[test]
fn test_ambiguous_question_text_rejected_by_ask() {
    let temp = TempDir::new().unwrap();
    let mut channel = Channel::init(temp.path(), "ambig").unwrap();
    join(&mut channel, "alice");

    // Seed the duplicate-text state two unsynced machines would produce
    for guid in ["qstn-cccc000000000001", "qstn-dddd000000000002"] {
        channel
            .commit(
                vec![fray_types::LogRecord::Question(fray_types::QuestionRecord {
                    id: guid.to_string(),
                    re: "ship friday?".to_string(),
                    from_agent: "alice".to_string(),
                    to_agent: None,
                    status: fray_types::QuestionStatus::Open,
                    thread: None,
                    asked_in: None,
                    created_at: 10,
                    options: vec![],
                    stamp: fray_types::Stamp::default(),
                })],
                vec![],
            )
            .unwrap();
    }

    let result = ops::question::ask(
        &mut channel,
        ops::question::AskParams {
            text: "ship friday?".to_string(),
            from_agent: "alice".to_string(),
            to_agent: None,
            thread_token: None,
            options: vec![],
        },
    );
    assert!(matches!(result, Err(fray_engine::Error::Ambiguous(_))));

    // Still two questions, and the ambiguity survives a rebuild
    channel.rebuild(|_| {}).unwrap();
    assert_eq!(queries::questions::list(channel.db().conn()).unwrap().len(), 2);
}

#[test]
fn test_question_status_survives_rebuild() {
    let temp = TempDir::new().unwrap();
    let mut channel = scripted_channel(&temp);

    channel.rebuild(|_| {}).unwrap();
    let questions = queries::questions::list(channel.db().conn()).unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].status, QuestionStatus::Answered);
    assert!(questions[0].answered_in.is_some());
}

#[test]
fn test_reopen_after_operations_does_not_rebuild_needlessly() {
    let temp = TempDir::new().unwrap();
    {
        let mut channel = Channel::init(temp.path(), "reopen").unwrap();
        join(&mut channel, "alice");
        post(&mut channel, "alice", "persisted");
    }

    // Fresh process: open again, cache should already hold the message
    let channel = Channel::open(temp.path()).unwrap();
    let room = queries::messages::list_home(channel.db().conn(), fray_types::ROOM, 10).unwrap();
    assert_eq!(room.len(), 1);
    assert_eq!(room[0].body, "persisted");
}

#[test]
fn test_cold_rebuild_from_logs_alone() {
    let temp = TempDir::new().unwrap();
    let fingerprint_before;
    {
        let channel = scripted_channel(&temp);
        fingerprint_before = cache_fingerprint(&channel);
    }

    // Delete the cache outright; reopening must reconstruct it from logs
    std::fs::remove_file(temp.path().join(".fray/fray.db")).unwrap();
    let channel = Channel::open(temp.path()).unwrap();
    assert_eq!(fingerprint_before, cache_fingerprint(&channel));
}
