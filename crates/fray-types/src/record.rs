use serde::{Deserialize, Serialize};

use crate::entity::{ClaimType, MessageKind, Presence, QuestionOption, QuestionStatus, ThreadStatus};
use crate::invoke::InvokeConfig;
use crate::patch::{Patch, patch};

/// Append streams, one JSONL file per stream per machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Messages,
    MessageUpdates,
    Agents,
    AgentUpdates,
    Threads,
    ThreadUpdates,
    ThreadsSubscribe,
    ThreadsUnsubscribe,
    ThreadsMute,
    ThreadsUnmute,
    ThreadMessages,
    ThreadMessageRemoves,
    MessagePins,
    MessageUnpins,
    Questions,
    QuestionUpdates,
    Reactions,
    Claims,
    ClaimClears,
    SessionStarts,
    SessionEnds,
}

impl Stream {
    pub const ALL: &'static [Stream] = &[
        Stream::Messages,
        Stream::MessageUpdates,
        Stream::Agents,
        Stream::AgentUpdates,
        Stream::Threads,
        Stream::ThreadUpdates,
        Stream::ThreadsSubscribe,
        Stream::ThreadsUnsubscribe,
        Stream::ThreadsMute,
        Stream::ThreadsUnmute,
        Stream::ThreadMessages,
        Stream::ThreadMessageRemoves,
        Stream::MessagePins,
        Stream::MessageUnpins,
        Stream::Questions,
        Stream::QuestionUpdates,
        Stream::Reactions,
        Stream::Claims,
        Stream::ClaimClears,
        Stream::SessionStarts,
        Stream::SessionEnds,
    ];

    /// File basename without the `.jsonl` extension.
    pub fn basename(&self) -> &'static str {
        match self {
            Stream::Messages => "messages",
            Stream::MessageUpdates => "message-updates",
            Stream::Agents => "agents",
            Stream::AgentUpdates => "agent-updates",
            Stream::Threads => "threads",
            Stream::ThreadUpdates => "thread-updates",
            Stream::ThreadsSubscribe => "threads-subscribe",
            Stream::ThreadsUnsubscribe => "threads-unsubscribe",
            Stream::ThreadsMute => "threads-mute",
            Stream::ThreadsUnmute => "threads-unmute",
            Stream::ThreadMessages => "thread-messages",
            Stream::ThreadMessageRemoves => "thread-message-removes",
            Stream::MessagePins => "message-pins",
            Stream::MessageUnpins => "message-unpins",
            Stream::Questions => "questions",
            Stream::QuestionUpdates => "question-updates",
            Stream::Reactions => "reactions",
            Stream::Claims => "claims",
            Stream::ClaimClears => "claim-clears",
            Stream::SessionStarts => "session-starts",
            Stream::SessionEnds => "session-ends",
        }
    }

    pub fn from_basename(name: &str) -> Option<Stream> {
        Stream::ALL.iter().copied().find(|s| s.basename() == name)
    }
}

/// Origin fields stamped on every record at append time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    pub ts: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
    #[serde(default)]
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    Message(MessageRecord),
    MessageUpdate(MessageUpdateRecord),
    Agent(AgentRecord),
    AgentUpdate(AgentUpdateRecord),
    Thread(ThreadRecord),
    ThreadUpdate(ThreadUpdateRecord),
    ThreadSubscribe(ThreadSubscribeRecord),
    ThreadUnsubscribe(ThreadSubscribeRecord),
    ThreadMute(ThreadSubscribeRecord),
    ThreadUnmute(ThreadSubscribeRecord),
    ThreadMessage(ThreadMessageRecord),
    ThreadMessageRemove(ThreadMessageRecord),
    MessagePin(MessagePinRecord),
    MessageUnpin(MessagePinRecord),
    Question(QuestionRecord),
    QuestionUpdate(QuestionUpdateRecord),
    Reaction(ReactionRecord),
    Claim(ClaimRecord),
    ClaimClear(ClaimClearRecord),
    SessionStart(SessionStartRecord),
    SessionEnd(SessionEndRecord),
    GhostCursor(GhostCursorRecord),
    GhostCursorAck(GhostCursorAckRecord),
    HookInstall(HookInstallRecord),
}

impl LogRecord {
    /// The shared stream a record belongs to. `None` for machine-private
    /// records, which go to `local/runtime.jsonl` instead.
    pub fn stream(&self) -> Option<Stream> {
        match self {
            LogRecord::Message(_) => Some(Stream::Messages),
            LogRecord::MessageUpdate(_) => Some(Stream::MessageUpdates),
            LogRecord::Agent(_) => Some(Stream::Agents),
            LogRecord::AgentUpdate(_) => Some(Stream::AgentUpdates),
            LogRecord::Thread(_) => Some(Stream::Threads),
            LogRecord::ThreadUpdate(_) => Some(Stream::ThreadUpdates),
            LogRecord::ThreadSubscribe(_) => Some(Stream::ThreadsSubscribe),
            LogRecord::ThreadUnsubscribe(_) => Some(Stream::ThreadsUnsubscribe),
            LogRecord::ThreadMute(_) => Some(Stream::ThreadsMute),
            LogRecord::ThreadUnmute(_) => Some(Stream::ThreadsUnmute),
            LogRecord::ThreadMessage(_) => Some(Stream::ThreadMessages),
            LogRecord::ThreadMessageRemove(_) => Some(Stream::ThreadMessageRemoves),
            LogRecord::MessagePin(_) => Some(Stream::MessagePins),
            LogRecord::MessageUnpin(_) => Some(Stream::MessageUnpins),
            LogRecord::Question(_) => Some(Stream::Questions),
            LogRecord::QuestionUpdate(_) => Some(Stream::QuestionUpdates),
            LogRecord::Reaction(_) => Some(Stream::Reactions),
            LogRecord::Claim(_) => Some(Stream::Claims),
            LogRecord::ClaimClear(_) => Some(Stream::ClaimClears),
            LogRecord::SessionStart(_) => Some(Stream::SessionStarts),
            LogRecord::SessionEnd(_) => Some(Stream::SessionEnds),
            LogRecord::GhostCursor(_)
            | LogRecord::GhostCursorAck(_)
            | LogRecord::HookInstall(_) => None,
        }
    }

    pub fn stamp(&self) -> &Stamp {
        match self {
            LogRecord::Message(r) => &r.stamp,
            LogRecord::MessageUpdate(r) => &r.stamp,
            LogRecord::Agent(r) => &r.stamp,
            LogRecord::AgentUpdate(r) => &r.stamp,
            LogRecord::Thread(r) => &r.stamp,
            LogRecord::ThreadUpdate(r) => &r.stamp,
            LogRecord::ThreadSubscribe(r)
            | LogRecord::ThreadUnsubscribe(r)
            | LogRecord::ThreadMute(r)
            | LogRecord::ThreadUnmute(r) => &r.stamp,
            LogRecord::ThreadMessage(r) | LogRecord::ThreadMessageRemove(r) => &r.stamp,
            LogRecord::MessagePin(r) | LogRecord::MessageUnpin(r) => &r.stamp,
            LogRecord::Question(r) => &r.stamp,
            LogRecord::QuestionUpdate(r) => &r.stamp,
            LogRecord::Reaction(r) => &r.stamp,
            LogRecord::Claim(r) => &r.stamp,
            LogRecord::ClaimClear(r) => &r.stamp,
            LogRecord::SessionStart(r) => &r.stamp,
            LogRecord::SessionEnd(r) => &r.stamp,
            LogRecord::GhostCursor(r) => &r.stamp,
            LogRecord::GhostCursorAck(r) => &r.stamp,
            LogRecord::HookInstall(r) => &r.stamp,
        }
    }

    pub fn stamp_mut(&mut self) -> &mut Stamp {
        match self {
            LogRecord::Message(r) => &mut r.stamp,
            LogRecord::MessageUpdate(r) => &mut r.stamp,
            LogRecord::Agent(r) => &mut r.stamp,
            LogRecord::AgentUpdate(r) => &mut r.stamp,
            LogRecord::ThreadSubscribe(r)
            | LogRecord::ThreadUnsubscribe(r)
            | LogRecord::ThreadMute(r)
            | LogRecord::ThreadUnmute(r) => &mut r.stamp,
            LogRecord::Thread(r) => &mut r.stamp,
            LogRecord::ThreadUpdate(r) => &mut r.stamp,
            LogRecord::ThreadMessage(r) | LogRecord::ThreadMessageRemove(r) => &mut r.stamp,
            LogRecord::MessagePin(r) | LogRecord::MessageUnpin(r) => &mut r.stamp,
            LogRecord::Question(r) => &mut r.stamp,
            LogRecord::QuestionUpdate(r) => &mut r.stamp,
            LogRecord::Reaction(r) => &mut r.stamp,
            LogRecord::Claim(r) => &mut r.stamp,
            LogRecord::ClaimClear(r) => &mut r.stamp,
            LogRecord::SessionStart(r) => &mut r.stamp,
            LogRecord::SessionEnd(r) => &mut r.stamp,
            LogRecord::GhostCursor(r) => &mut r.stamp,
            LogRecord::GhostCursorAck(r) => &mut r.stamp,
            LogRecord::HookInstall(r) => &mut r.stamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub from_agent: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    pub kind: MessageKind,
    pub home: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_source: Option<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdateRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub body: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub edited_at: Patch<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub archived_at: Patch<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub managed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoke: Option<InvokeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub registered_at: i64,
    pub last_seen: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdateRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub goal: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub bio: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub presence: Patch<Presence>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub status: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub last_seen: Patch<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub left_at: Patch<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub invoke: Patch<InvokeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub mention_watermark: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub avatar: Patch<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default)]
    pub anchor_hidden: bool,
    pub created_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadUpdateRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub parent_thread: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub status: Patch<ThreadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub anchor: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub anchor_hidden: Patch<bool>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSubscribeRecord {
    pub thread_guid: String,
    pub agent_id: String,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessageRecord {
    pub thread_guid: String,
    pub message_guid: String,
    pub added_by: String,
    pub added_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePinRecord {
    pub thread_guid: String,
    pub message_guid: String,
    pub agent_id: String,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,
    pub re: String,
    pub from_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    pub status: QuestionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asked_in: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionUpdateRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub status: Patch<QuestionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub to_agent: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub asked_in: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
    pub answered_in: Patch<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub message_guid: String,
    pub from_agent: String,
    pub reaction: String,
    pub reacted_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claim_type: ClaimType,
    pub pattern: String,
    pub agent_id: String,
    pub claimed_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimClearRecord {
    pub agent_id: String,
    /// None clears every claim held by the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_type: Option<ClaimType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStartRecord {
    pub agent_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub started_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEndRecord {
    pub agent_id: String,
    pub session_id: String,
    pub reason: String,
    pub ended_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostCursorRecord {
    pub agent_id: String,
    pub home: String,
    pub message_guid: String,
    pub assigned_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostCursorAckRecord {
    pub agent_id: String,
    pub home: String,
    pub acked_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookInstallRecord {
    pub hook: String,
    pub installed_at: i64,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_record_wire_shape() {
        let record = LogRecord::Message(MessageRecord {
            id: "msg-1".to_string(),
            from_agent: "alice".to_string(),
            body: "hi @bob".to_string(),
            mentions: vec!["bob".to_string()],
            kind: MessageKind::Agent,
            home: "room".to_string(),
            reply_to: None,
            quote: None,
            references: None,
            surface_source: None,
            stamp: Stamp { ts: 100, origin: "mch-aa".to_string(), seq: 7 },
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["id"], "msg-1");
        assert_eq!(json["mentions"][0], "bob");
        assert_eq!(json["ts"], 100);
        assert_eq!(json["seq"], 7);
        assert!(json.get("reply_to").is_none());
    }

    #[test]
    fn test_update_record_tri_state_on_wire() {
        let record = MessageUpdateRecord {
            id: "msg-1".to_string(),
            body: Some(Some("new".to_string())),
            edited_at: Some(Some(123)),
            archived_at: Some(None),
            reason: None,
            stamp: Stamp::default(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["body"], "new");
        assert_eq!(json["archived_at"], serde_json::Value::Null);
        assert!(json.get("reason").is_none());

        let back: MessageUpdateRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.archived_at, Some(None));
        assert_eq!(back.reason, None);
    }

    #[test]
    fn test_stream_basenames_are_unique() {
        let mut names: Vec<&str> = Stream::ALL.iter().map(|s| s.basename()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Stream::ALL.len());
    }

    #[test]
    fn test_record_stream_mapping() {
        for stream in Stream::ALL {
            assert_eq!(Stream::from_basename(stream.basename()), Some(*stream));
        }
    }
}
