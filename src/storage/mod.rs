//! Persistence for session inputs, rules and assistant instructions
//!
//! A small key-value seam with a file-backed and an in-memory store, and a
//! gateway that never lets a storage failure reach its caller.

mod gateway;
mod store;

pub use gateway::{Gateway, DEFAULT_INSTRUCTION, KEY_INSTRUCTION, KEY_LOGIC, KEY_RULES, KEY_SESSION};
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageError};
