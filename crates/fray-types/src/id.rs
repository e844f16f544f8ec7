use uuid::Uuid;

/// Kind of a type-prefixed GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Message,
    Agent,
    Thread,
    Question,
    Channel,
    Job,
    Session,
    Machine,
}

impl IdKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            IdKind::Message => "msg",
            IdKind::Agent => "usr",
            IdKind::Thread => "thrd",
            IdKind::Question => "qstn",
            IdKind::Channel => "ch",
            IdKind::Job => "job",
            IdKind::Session => "s",
            IdKind::Machine => "mch",
        }
    }
}

const ALL_KINDS: &[IdKind] = &[
    IdKind::Message,
    IdKind::Agent,
    IdKind::Thread,
    IdKind::Question,
    IdKind::Channel,
    IdKind::Job,
    IdKind::Session,
    IdKind::Machine,
];

/// Mint a fresh GUID of the given kind, e.g. `msg-9f8a…` (prefix + 32 hex).
pub fn new_id(kind: IdKind) -> String {
    format!("{}-{}", kind.prefix(), Uuid::new_v4().simple())
}

/// Classify a full GUID by its type prefix.
pub fn kind_of(id: &str) -> Option<IdKind> {
    let (prefix, rest) = id.split_once('-')?;
    if rest.is_empty() {
        return None;
    }
    ALL_KINDS.iter().copied().find(|k| k.prefix() == prefix)
}

/// Whether `id` is a full GUID of the given kind.
pub fn is_guid_of(kind: IdKind, id: &str) -> bool {
    match id.strip_prefix(kind.prefix()) {
        Some(rest) => {
            rest.starts_with('-')
                && rest.len() > 1
                && rest[1..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        }
        None => false,
    }
}

/// Short display prefix for a GUID: the first 7 hex chars after the type tag.
pub fn short_prefix(id: &str) -> &str {
    let hex = id.split_once('-').map(|(_, rest)| rest).unwrap_or(id);
    &hex[..hex.len().min(7)]
}
