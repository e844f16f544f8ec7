use serde::{Deserialize, Serialize};

use crate::invoke::InvokeConfig;

/// Agent presence as tracked by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Offline,
    Spawning,
    Active,
    Idle,
    Error,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Offline => "offline",
            Presence::Spawning => "spawning",
            Presence::Active => "active",
            Presence::Idle => "idle",
            Presence::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offline" => Some(Presence::Offline),
            "spawning" => Some(Presence::Spawning),
            "active" => Some(Presence::Active),
            "idle" => Some(Presence::Idle),
            "error" => Some(Presence::Error),
            _ => None,
        }
    }
}

/// A participant in the channel: human user or managed agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub guid: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub presence: Presence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub last_seen: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<i64>,
    pub managed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoke: Option<InvokeConfig>,
    /// GUID of the last mention the supervisor woke this agent for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention_watermark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub registered_at: i64,
}

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Agent,
    User,
    Event,
    Surface,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Agent => "agent",
            MessageKind::User => "user",
            MessageKind::Event => "event",
            MessageKind::Surface => "surface",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(MessageKind::Agent),
            "user" => Some(MessageKind::User),
            "event" => Some(MessageKind::Event),
            "surface" => Some(MessageKind::Surface),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub guid: String,
    pub ts: i64,
    pub from_agent: String,
    pub body: String,
    pub mentions: Vec<String>,
    pub kind: MessageKind,
    /// Thread GUID or the literal `room`.
    pub home: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    /// For `event` messages, the message this event refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<i64>,
    /// Machine id in multi-machine mode; empty on single-machine channels.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Open,
    Archived,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Open => "open",
            ThreadStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ThreadStatus::Open),
            "archived" => Some(ThreadStatus::Archived),
            _ => None,
        }
    }
}

/// Maximum depth of a thread's parent chain (room = 0, root thread = 1).
pub const MAX_THREAD_DEPTH: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub guid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread: Option<String>,
    pub status: ThreadStatus,
    /// Free-form tag such as `knowledge`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default)]
    pub anchor_hidden: bool,
    pub created_at: i64,
}

/// Question status lattice: unasked → open → answered → closed (open → closed
/// allowed); closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Unasked,
    Open,
    Answered,
    Closed,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Unasked => "unasked",
            QuestionStatus::Open => "open",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unasked" => Some(QuestionStatus::Unasked),
            "open" => Some(QuestionStatus::Open),
            "answered" => Some(QuestionStatus::Answered),
            "closed" => Some(QuestionStatus::Closed),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            QuestionStatus::Unasked => 0,
            QuestionStatus::Open => 1,
            QuestionStatus::Answered => 2,
            QuestionStatus::Closed => 3,
        }
    }

    /// Whether moving from `self` to `next` is a legal lattice transition.
    pub fn can_transition_to(&self, next: QuestionStatus) -> bool {
        if *self == QuestionStatus::Closed {
            return false;
        }
        next.rank() > self.rank()
    }
}

/// Option on a multi-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pros: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub guid: String,
    /// Subject text.
    pub re: String,
    pub from_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    pub status: QuestionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    /// The message that asked this question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asked_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_in: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
}

/// Exclusive work-item claim, unique per (claim_type, pattern).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    File,
    Bd,
    Issue,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::File => "file",
            ClaimType::Bd => "bd",
            ClaimType::Issue => "issue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(ClaimType::File),
            "bd" => Some(ClaimType::Bd),
            "issue" => Some(ClaimType::Issue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: ClaimType,
    pub pattern: String,
    pub agent_id: String,
    pub claimed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub message_guid: String,
    pub from_agent: String,
    pub reaction: String,
    pub reacted_at: i64,
}

/// Per-(agent, home) read cursor. Local state: survives cache rebuilds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadTo {
    pub agent_id: String,
    pub home: String,
    pub message_guid: String,
    pub ts: i64,
    pub set_at: i64,
}

/// Server-assigned must-read pointer; consumed only by explicit session ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostCursor {
    pub agent_id: String,
    pub home: String,
    pub message_guid: String,
    pub assigned_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ack: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_lattice() {
        use QuestionStatus::*;
        assert!(Unasked.can_transition_to(Open));
        assert!(Open.can_transition_to(Answered));
        assert!(Open.can_transition_to(Closed));
        assert!(Answered.can_transition_to(Closed));

        assert!(!Open.can_transition_to(Unasked));
        assert!(!Answered.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Answered));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_presence_round_trip() {
        for p in [
            Presence::Offline,
            Presence::Spawning,
            Presence::Active,
            Presence::Idle,
            Presence::Error,
        ] {
            assert_eq!(Presence::parse(p.as_str()), Some(p));
        }
        assert_eq!(Presence::parse("gone"), None);
    }

    #[test]
    fn test_message_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&MessageKind::Surface).unwrap();
        assert_eq!(json, r#""surface""#);
    }
}
