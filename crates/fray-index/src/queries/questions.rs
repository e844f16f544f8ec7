use fray_types::{Question, QuestionOption, QuestionStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Error, Result};

const COLUMNS: &str =
    "guid, re, from_agent, to_agent, status, thread_guid, asked_in, answered_in, created_at, options_json";

fn from_row(row: &Row) -> rusqlite::Result<Question> {
    let status: String = row.get(4)?;
    let options_json: Option<String> = row.get(9)?;
    Ok(Question {
        guid: row.get(0)?,
        re: row.get(1)?,
        from_agent: row.get(2)?,
        to_agent: row.get(3)?,
        status: QuestionStatus::parse(&status).unwrap_or(QuestionStatus::Open),
        thread: row.get(5)?,
        asked_in: row.get(6)?,
        answered_in: row.get(7)?,
        created_at: row.get(8)?,
        options: options_json
            .and_then(|json| serde_json::from_str::<Vec<QuestionOption>>(&json).ok())
            .unwrap_or_default(),
    })
}

pub fn insert(conn: &Connection, question: &Question) -> Result<()> {
    let options_json = if question.options.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&question.options)
                .map_err(|e| Error::Query(format!("question options: {}", e)))?,
        )
    };

    conn.execute(
        r#"
        INSERT INTO questions (guid, re, from_agent, to_agent, status, thread_guid,
                               asked_in, answered_in, created_at, options_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(guid) DO NOTHING
        "#,
        params![
            &question.guid,
            &question.re,
            &question.from_agent,
            &question.to_agent,
            question.status.as_str(),
            &question.thread,
            &question.asked_in,
            &question.answered_in,
            question.created_at,
            &options_json,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, guid: &str) -> Result<Option<Question>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM questions WHERE guid = ?1", COLUMNS),
            [guid],
            from_row,
        )
        .optional()?;
    Ok(result)
}

pub fn find_by_prefix(conn: &Connection, prefix: &str) -> Result<Option<String>> {
    let hex = prefix.strip_prefix("qstn-").unwrap_or(prefix);
    let pattern = format!("qstn-{}%", hex);

    let mut stmt = conn.prepare("SELECT guid FROM questions WHERE guid LIKE ?1 LIMIT 2")?;
    let mut matches: Vec<String> = stmt
        .query_map([&pattern], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches.remove(0))),
        _ => Err(Error::Query(format!(
            "Ambiguous question prefix '{}': multiple questions match",
            prefix
        ))),
    }
}

/// Case-insensitive subject-text match. Multiple open matches are returned
/// so the caller can surface the ambiguity.
pub fn find_by_text(conn: &Connection, text: &str) -> Result<Vec<Question>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM questions WHERE re = ?1 COLLATE NOCASE ORDER BY created_at",
        COLUMNS
    ))?;
    let questions = stmt
        .query_map([text], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(questions)
}

pub fn list_by_status(conn: &Connection, status: QuestionStatus) -> Result<Vec<Question>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM questions WHERE status = ?1 ORDER BY created_at",
        COLUMNS
    ))?;
    let questions = stmt
        .query_map([status.as_str()], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(questions)
}

pub fn list(conn: &Connection) -> Result<Vec<Question>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM questions ORDER BY created_at",
        COLUMNS
    ))?;
    let questions = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(questions)
}

pub struct QuestionPatch<'a> {
    pub status: Option<QuestionStatus>,
    pub to_agent: Option<Option<&'a str>>,
    pub asked_in: Option<Option<&'a str>>,
    pub answered_in: Option<Option<&'a str>>,
}

impl Default for QuestionPatch<'_> {
    fn default() -> Self {
        Self {
            status: None,
            to_agent: None,
            asked_in: None,
            answered_in: None,
        }
    }
}

/// Apply a tri-state question update. Status changes that violate the
/// lattice are ignored here; live ops reject them before writing, and
/// replayed stale records must not regress state.
pub fn apply_update(conn: &Connection, guid: &str, patch: &QuestionPatch) -> Result<()> {
    if let Some(next) = patch.status {
        let current = get(conn, guid)?;
        if let Some(current) = current
            && current.status.can_transition_to(next)
        {
            conn.execute(
                "UPDATE questions SET status = ?1 WHERE guid = ?2",
                params![next.as_str(), guid],
            )?;
        }
    }
    if let Some(to_agent) = &patch.to_agent {
        conn.execute(
            "UPDATE questions SET to_agent = ?1 WHERE guid = ?2",
            params![to_agent.map(|s| s.to_string()), guid],
        )?;
    }
    if let Some(asked_in) = &patch.asked_in {
        conn.execute(
            "UPDATE questions SET asked_in = ?1 WHERE guid = ?2",
            params![asked_in.map(|s| s.to_string()), guid],
        )?;
    }
    if let Some(answered_in) = &patch.answered_in {
        conn.execute(
            "UPDATE questions SET answered_in = ?1 WHERE guid = ?2",
            params![answered_in.map(|s| s.to_string()), guid],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn question(guid: &str, re: &str, status: QuestionStatus) -> Question {
        Question {
            guid: guid.to_string(),
            re: re.to_string(),
            from_agent: "alice".to_string(),
            to_agent: None,
            status,
            thread: None,
            asked_in: None,
            answered_in: None,
            created_at: 10,
            options: vec![],
        }
    }

    #[test]
    fn test_status_lattice_enforced_on_update() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &question("qstn-1", "deploy?", QuestionStatus::Open)).unwrap();

        apply_update(
            db.conn(),
            "qstn-1",
            &QuestionPatch {
                status: Some(QuestionStatus::Closed),
                ..QuestionPatch::default()
            },
        )
        .unwrap();
        assert_eq!(
            get(db.conn(), "qstn-1").unwrap().unwrap().status,
            QuestionStatus::Closed
        );

        // Closed is terminal: a stale replayed record cannot reopen
        apply_update(
            db.conn(),
            "qstn-1",
            &QuestionPatch {
                status: Some(QuestionStatus::Answered),
                ..QuestionPatch::default()
            },
        )
        .unwrap();
        assert_eq!(
            get(db.conn(), "qstn-1").unwrap().unwrap().status,
            QuestionStatus::Closed
        );
    }

    #[test]
    fn test_find_by_text_returns_all_matches() {
        let db = Database::open_in_memory().unwrap();
        insert(db.conn(), &question("qstn-1", "which db?", QuestionStatus::Open)).unwrap();
        insert(db.conn(), &question("qstn-2", "Which DB?", QuestionStatus::Open)).unwrap();

        let matches = find_by_text(db.conn(), "which db?").unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_options_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut q = question("qstn-1", "pick one", QuestionStatus::Open);
        q.options = vec![QuestionOption {
            label: "B2B".to_string(),
            pros: vec!["revenue".to_string()],
            cons: vec![],
        }];
        insert(db.conn(), &q).unwrap();

        let fetched = get(db.conn(), "qstn-1").unwrap().unwrap();
        assert_eq!(fetched.options.len(), 1);
        assert_eq!(fetched.options[0].label, "B2B");
    }
}
