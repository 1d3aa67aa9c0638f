//! Built-in modules

pub mod heartbeat;
pub mod memory_storage;
