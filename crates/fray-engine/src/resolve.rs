use fray_core::AgentRef;
use fray_index::queries;
use fray_types::{IdKind, QuestionStatus, is_guid_of};
use rusqlite::Connection;

use crate::error::{Error, Result};

/// Minimum GUID-prefix length accepted by any resolver.
pub const MIN_PREFIX: usize = 4;

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn ambiguous_to_error(err: fray_index::Error) -> Error {
    match err {
        fray_index::Error::Query(msg) => Error::Ambiguous(msg),
        other => Error::Index(other),
    }
}

/// Resolve a message token: `#<hex>`, bare hex, `msg-<guid>`, or a GUID
/// prefix of at least four characters.
pub fn resolve_message(conn: &Connection, token: &str) -> Result<String> {
    let token = token.trim();
    let hex = token.strip_prefix('#').unwrap_or(token);

    if is_guid_of(IdKind::Message, hex) {
        if queries::messages::exists(conn, hex)? {
            return Ok(hex.to_string());
        }
        return Err(Error::NotFound(format!("no message {}", hex)));
    }

    let bare = hex.strip_prefix("msg-").unwrap_or(hex);
    if !is_hex(bare) {
        return Err(Error::InvalidInput(format!(
            "not a message reference: {}",
            token
        )));
    }
    if bare.len() < MIN_PREFIX {
        return Err(Error::InvalidInput(format!(
            "message prefix too short (need {} chars): {}",
            MIN_PREFIX, token
        )));
    }

    queries::messages::find_by_prefix(conn, bare)
        .map_err(ambiguous_to_error)?
        .ok_or_else(|| Error::NotFound(format!("no message matching {}", token)))
}

/// Resolve a thread token: GUID, GUID prefix, root-level name, or a
/// slash-path walked by name under each level.
pub fn resolve_thread(conn: &Connection, token: &str) -> Result<String> {
    let token = token.trim();

    if is_guid_of(IdKind::Thread, token) {
        if queries::threads::get(conn, token)?.is_some() {
            return Ok(token.to_string());
        }
        return Err(Error::NotFound(format!("no thread {}", token)));
    }

    if token.contains('/') {
        return resolve_thread_path(conn, token);
    }

    // GUID prefix beats name, name match is the case-insensitive fallback
    let bare = token.strip_prefix("thrd-").unwrap_or(token);
    if is_hex(bare) && bare.len() >= MIN_PREFIX
        && let Some(guid) =
            queries::threads::find_by_prefix(conn, bare).map_err(ambiguous_to_error)?
    {
        return Ok(guid);
    }

    let mut at_root = queries::threads::find_child_by_name(conn, None, token)?;
    if at_root.is_empty() {
        at_root = queries::threads::find_by_name(conn, token)?
            .into_iter()
            .filter(|t| t.parent_thread.is_none())
            .collect();
    }
    match at_root.len() {
        0 => Err(Error::NotFound(format!("no thread named {}", token))),
        1 => Ok(at_root.remove(0).guid),
        _ => Err(Error::Ambiguous(format!(
            "thread name '{}' matches {} root threads",
            token,
            at_root.len()
        ))),
    }
}

fn resolve_thread_path(conn: &Connection, path: &str) -> Result<String> {
    let mut parent: Option<String> = None;
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidInput(format!("bad thread path: {}", path)));
        }
        let mut matches = queries::threads::find_child_by_name(conn, parent.as_deref(), segment)?;
        match matches.len() {
            0 => {
                return Err(Error::NotFound(format!(
                    "no thread '{}' under {}",
                    segment,
                    parent.as_deref().unwrap_or("root")
                )));
            }
            1 => parent = Some(matches.remove(0).guid),
            _ => {
                return Err(Error::Ambiguous(format!(
                    "thread path segment '{}' is ambiguous",
                    segment
                )));
            }
        }
    }
    parent.ok_or_else(|| Error::InvalidInput(format!("bad thread path: {}", path)))
}

/// Resolve a question token: GUID, GUID prefix, or full subject text.
/// Subject text matching two or more open questions is an ambiguity, never
/// a silent pick.
pub fn resolve_question(conn: &Connection, token: &str) -> Result<String> {
    let token = token.trim();

    if is_guid_of(IdKind::Question, token) {
        if queries::questions::get(conn, token)?.is_some() {
            return Ok(token.to_string());
        }
        return Err(Error::NotFound(format!("no question {}", token)));
    }

    let bare = token.strip_prefix("qstn-").unwrap_or(token);
    if is_hex(bare) {
        if bare.len() < MIN_PREFIX {
            return Err(Error::InvalidInput(format!(
                "question prefix too short (need {} chars): {}",
                MIN_PREFIX, token
            )));
        }
        if let Some(guid) =
            queries::questions::find_by_prefix(conn, bare).map_err(ambiguous_to_error)?
        {
            return Ok(guid);
        }
    }

    let matches = queries::questions::find_by_text(conn, token)?;
    let open: Vec<_> = matches
        .iter()
        .filter(|q| q.status == QuestionStatus::Open || q.status == QuestionStatus::Unasked)
        .collect();
    match (open.len(), matches.len()) {
        (1, _) => Ok(open[0].guid.clone()),
        (0, 1) => Ok(matches[0].guid.clone()),
        (0, 0) => Err(Error::NotFound(format!("no question matching {}", token))),
        (0, n) => Err(Error::Ambiguous(format!(
            "question text matches {} closed questions",
            n
        ))),
        (n, _) => Err(Error::Ambiguous(format!(
            "question text matches {} open questions",
            n
        ))),
    }
}

/// Resolve an agent token to its handle. Returns the base name unless the
/// caller asked for the variant-qualified form.
pub fn resolve_agent(conn: &Connection, token: &str, variant_qualified: bool) -> Result<String> {
    let token = token.trim();

    if is_guid_of(IdKind::Agent, token) {
        return match queries::agents::get_by_guid(conn, token)? {
            Some(agent) => Ok(agent.agent_id),
            None => Err(Error::NotFound(format!("no agent {}", token))),
        };
    }

    let reference = AgentRef::parse(token)
        .ok_or_else(|| Error::InvalidInput(format!("not an agent reference: {}", token)))?;

    let wanted = if variant_qualified {
        reference.qualified()
    } else {
        reference.base().to_string()
    };

    if let Some(agent) = queries::agents::get_by_agent_id(conn, &wanted)? {
        return Ok(agent.agent_id);
    }

    // Fall back to the base handle, then a case-insensitive match
    if let Some(agent) = queries::agents::get_by_agent_id(conn, reference.base())? {
        return Ok(agent.agent_id);
    }
    let ci = queries::agents::get_by_agent_id_ci(conn, reference.base())?;
    match ci.len() {
        0 => Err(Error::NotFound(format!("no agent named {}", reference.base()))),
        1 => Ok(ci[0].agent_id.clone()),
        _ => Err(Error::Ambiguous(format!(
            "agent name '{}' matches {} agents",
            reference.base(),
            ci.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_index::Database;
    use fray_types::{Agent, Message, MessageKind, Presence, Question, Thread, ThreadStatus};

    fn seed(db: &Database) {
        queries::agents::insert(
            db.conn(),
            &Agent {
                guid: "usr-aaaa1111".to_string(),
                agent_id: "alice".to_string(),
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
                registered_at: 0,
            },
        )
        .unwrap();

        queries::messages::insert(
            db.conn(),
            &Message {
                guid: "msg-deadbeef01".to_string(),
                ts: 1,
                from_agent: "alice".to_string(),
                body: "hello".to_string(),
                mentions: vec![],
                kind: MessageKind::Agent,
                home: "room".to_string(),
                reply_to: None,
                quote: None,
                references: None,
                surface_source: None,
                edited_at: None,
                archived_at: None,
                origin: String::new(),
            },
            1,
        )
        .unwrap();

        for (guid, name, parent) in [
            ("thrd-aa01", "analysis", None),
            ("thrd-aa02", "notes", Some("thrd-aa01")),
            ("thrd-bb01", "backlog", None),
        ] {
            queries::threads::insert(
                db.conn(),
                &Thread {
                    guid: guid.to_string(),
                    name: name.to_string(),
                    parent_thread: parent.map(|s: &str| s.to_string()),
                    status: ThreadStatus::Open,
                    kind: None,
                    anchor: None,
                    anchor_hidden: false,
                    created_at: 0,
                },
            )
            .unwrap();
        }

        queries::questions::insert(
            db.conn(),
            &Question {
                guid: "qstn-12ab34cd".to_string(),
                re: "target market?".to_string(),
                from_agent: "alice".to_string(),
                to_agent: None,
                status: QuestionStatus::Open,
                thread: None,
                asked_in: None,
                answered_in: None,
                created_at: 0,
                options: vec![],
            },
        )
        .unwrap();
    }

    #[test]
    fn test_message_by_hash_prefix() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        assert_eq!(
            resolve_message(db.conn(), "#dead").unwrap(),
            "msg-deadbeef01"
        );
        assert_eq!(
            resolve_message(db.conn(), "deadbeef").unwrap(),
            "msg-deadbeef01"
        );
        assert_eq!(
            resolve_message(db.conn(), "msg-deadbeef01").unwrap(),
            "msg-deadbeef01"
        );
    }

    #[test]
    fn test_message_prefix_too_short() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        assert!(matches!(
            resolve_message(db.conn(), "#dea"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_thread_by_path() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        assert_eq!(
            resolve_thread(db.conn(), "analysis/notes").unwrap(),
            "thrd-aa02"
        );
        assert!(matches!(
            resolve_thread(db.conn(), "analysis/missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_thread_by_root_name() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        assert_eq!(resolve_thread(db.conn(), "backlog").unwrap(), "thrd-bb01");
    }

    #[test]
    fn test_question_by_text_and_prefix() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        assert_eq!(
            resolve_question(db.conn(), "target market?").unwrap(),
            "qstn-12ab34cd"
        );
        assert_eq!(
            resolve_question(db.conn(), "12ab").unwrap(),
            "qstn-12ab34cd"
        );
    }

    #[test]
    fn test_question_text_ambiguity_surfaces() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        queries::questions::insert(
            db.conn(),
            &Question {
                guid: "qstn-99ff00aa".to_string(),
                re: "target market?".to_string(),
                from_agent: "bob".to_string(),
                to_agent: None,
                status: QuestionStatus::Open,
                thread: None,
                asked_in: None,
                answered_in: None,
                created_at: 5,
                options: vec![],
            },
        )
        .unwrap();

        assert!(matches!(
            resolve_question(db.conn(), "target market?"),
            Err(Error::Ambiguous(_))
        ));
    }

    #[test]
    fn test_agent_forms() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        assert_eq!(resolve_agent(db.conn(), "@alice", false).unwrap(), "alice");
        assert_eq!(resolve_agent(db.conn(), "alice", false).unwrap(), "alice");
        assert_eq!(
            resolve_agent(db.conn(), "alice@laptop", false).unwrap(),
            "alice"
        );
        assert_eq!(
            resolve_agent(db.conn(), "usr-aaaa1111", false).unwrap(),
            "alice"
        );
        assert_eq!(resolve_agent(db.conn(), "ALICE", false).unwrap(), "alice");
        assert!(matches!(
            resolve_agent(db.conn(), "nobody", false),
            Err(Error::NotFound(_))
        ));
    }
}
