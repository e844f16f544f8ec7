mod apply;
mod channel;
mod config;
mod error;
mod notifs;
mod rebuild;
mod resolve;

pub mod ops;

pub use apply::{ApplyOutcome, apply_record};
pub use channel::{AGENT_ID_ENV, Channel, CommitReceipt};
pub use config::{ChannelConfig, SyncConfig};
pub use error::{Error, Result};
pub use notifs::{UnreadBoundary, UnreadMentions, peek_unread_mentions, take_unread_mentions};
pub use rebuild::{RebuildProgress, RebuildService};
pub use resolve::{resolve_agent, resolve_message, resolve_question, resolve_thread};
