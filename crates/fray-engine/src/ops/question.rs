use fray_index::queries;
use fray_types::{
    IdKind, LogRecord, MessageKind, MessageRecord, Question, QuestionOption, QuestionRecord,
    QuestionStatus, QuestionUpdateRecord, ROOM, Stamp, new_id, now_ts,
};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::resolve;

pub struct AskParams {
    pub text: String,
    pub from_agent: String,
    pub to_agent: Option<String>,
    pub thread_token: Option<String>,
    pub options: Vec<QuestionOption>,
}

/// Ask a question. If the text already resolves to exactly one open
/// question, that question is returned (an `unasked` one is upgraded to
/// `open`) instead of creating a duplicate.
pub fn ask(channel: &mut Channel, params: AskParams) -> Result<Question> {
    let text = params.text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("question text cannot be empty".to_string()));
    }

    // An ambiguous text match is surfaced, never a silent third duplicate
    match resolve::resolve_question(channel.db().conn(), text) {
        Ok(existing_guid) => {
            let existing = queries::questions::get(channel.db().conn(), &existing_guid)?
                .ok_or_else(|| Error::NotFound(format!("no question {}", existing_guid)))?;
            if existing.status == QuestionStatus::Unasked {
                return open_existing(channel, existing);
            }
            return Ok(existing);
        }
        Err(Error::Ambiguous(message)) => return Err(Error::Ambiguous(message)),
        Err(Error::NotFound(_)) | Err(Error::InvalidInput(_)) => {}
        Err(other) => return Err(other),
    }

    let to_agent = match &params.to_agent {
        Some(token) => Some(resolve::resolve_agent(channel.db().conn(), token, false)?),
        None => None,
    };
    let thread = match &params.thread_token {
        Some(token) => Some(resolve::resolve_thread(channel.db().conn(), token)?),
        None => None,
    };

    let question_guid = new_id(IdKind::Question);
    let message_guid = new_id(IdKind::Message);
    let now = now_ts();

    let mut mentions = Vec::new();
    if let Some(to) = &to_agent {
        mentions.push(to.clone());
    }

    let ask_message = MessageRecord {
        id: message_guid.clone(),
        from_agent: params.from_agent.clone(),
        body: text.to_string(),
        mentions,
        kind: MessageKind::Agent,
        home: thread.clone().unwrap_or_else(|| ROOM.to_string()),
        reply_to: None,
        quote: None,
        references: None,
        surface_source: None,
        stamp: Stamp::default(),
    };

    let question = QuestionRecord {
        id: question_guid.clone(),
        re: text.to_string(),
        from_agent: params.from_agent,
        to_agent,
        status: QuestionStatus::Open,
        thread,
        asked_in: Some(message_guid),
        created_at: now,
        options: params.options,
        stamp: Stamp::default(),
    };

    channel.commit(
        vec![
            LogRecord::Message(ask_message),
            LogRecord::Question(question),
        ],
        vec![],
    )?;

    queries::questions::get(channel.db().conn(), &question_guid)?
        .ok_or_else(|| Error::NotFound(format!("question {} missing after commit", question_guid)))
}

fn open_existing(channel: &mut Channel, question: Question) -> Result<Question> {
    let record = QuestionUpdateRecord {
        id: question.guid.clone(),
        status: Some(Some(QuestionStatus::Open)),
        ..QuestionUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::QuestionUpdate(record)], vec![])?;
    queries::questions::get(channel.db().conn(), &question.guid)?
        .ok_or_else(|| Error::NotFound(format!("no question {}", question.guid)))
}

/// Mark a question answered by the given message. Guarded by the status
/// lattice: closed questions reject any further transition.
pub fn answer(channel: &mut Channel, question_token: &str, message_guid: &str) -> Result<Question> {
    let guid = resolve::resolve_question(channel.db().conn(), question_token)?;
    let question = queries::questions::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no question {}", guid)))?;

    if !question.status.can_transition_to(QuestionStatus::Answered) {
        return Err(Error::InvalidInput(format!(
            "question is {} and cannot move to answered",
            question.status.as_str()
        )));
    }

    let record = QuestionUpdateRecord {
        id: guid.clone(),
        status: Some(Some(QuestionStatus::Answered)),
        answered_in: Some(Some(message_guid.to_string())),
        ..QuestionUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::QuestionUpdate(record)], vec![])?;

    queries::questions::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no question {}", guid)))
}

/// Close a question. Terminal: once closed nothing else succeeds.
pub fn close(channel: &mut Channel, question_token: &str) -> Result<Question> {
    let guid = resolve::resolve_question(channel.db().conn(), question_token)?;
    let question = queries::questions::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no question {}", guid)))?;

    if !question.status.can_transition_to(QuestionStatus::Closed) {
        return Err(Error::InvalidInput(format!(
            "question is already {}",
            question.status.as_str()
        )));
    }

    let record = QuestionUpdateRecord {
        id: guid.clone(),
        status: Some(Some(QuestionStatus::Closed)),
        ..QuestionUpdateRecord::default()
    };
    channel.commit(vec![LogRecord::QuestionUpdate(record)], vec![])?;

    queries::questions::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no question {}", guid)))
}

pub fn get(channel: &Channel, token: &str) -> Result<Question> {
    let guid = resolve::resolve_question(channel.db().conn(), token)?;
    queries::questions::get(channel.db().conn(), &guid)?
        .ok_or_else(|| Error::NotFound(format!("no question {}", guid)))
}

pub fn list(channel: &Channel, status: Option<QuestionStatus>) -> Result<Vec<Question>> {
    match status {
        Some(status) => Ok(queries::questions::list_by_status(channel.db().conn(), status)?),
        None => Ok(queries::questions::list(channel.db().conn())?),
    }
}
