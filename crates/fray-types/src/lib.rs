mod entity;
mod id;
mod invoke;
mod mention;
mod patch;
mod record;

pub use entity::*;
pub use id::{IdKind, is_guid_of, kind_of, new_id, short_prefix};
pub use invoke::{InvokeConfig, PromptDelivery};
pub use mention::{extract_mention_tokens, is_single_emoji};
pub use patch::Patch;
pub use record::*;

use chrono::Utc;

/// Current wall clock as epoch seconds, the timestamp unit used on the wire.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// The literal home value for channel-level messages that live in no thread.
pub const ROOM: &str = "room";
