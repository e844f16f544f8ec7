pub mod agents;
pub mod claims;
pub mod collisions;
pub mod config;
pub mod messages;
pub mod questions;
pub mod read_state;
pub mod reactions;
pub mod sessions;
pub mod threads;
