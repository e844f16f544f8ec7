mod error;
mod migrate;
mod reader;
mod store;

pub use error::{Error, Result};
pub use migrate::{MigrationReport, migrate_to_multi_machine};
pub use reader::{RawRecord, ReadReport, read_runtime_records, read_stream_file};
pub use store::{LogStore, StoreLayout};
