// Derived relational cache
// The JSONL logs are authoritative; this database only exists for fast
// queries and is safe to delete at any time.

mod db;
mod error;
mod schema;

pub mod queries;

pub use db::{Database, LocalState, WriterLock};
pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
