//! Test utilities for driving the fray CLI against throwaway channels.

mod fixtures;
mod world;

pub use fixtures::{raw_agent_line, raw_message_line, write_shard_file};
pub use world::{TestWorld, TestWorldBuilder};
