// Library crate - exports shared types, the level engine and its surfaces

pub mod types;
pub mod engine;
pub mod storage;
pub mod import;
pub mod assistant;
pub mod classifier;
pub mod api;

// Re-export commonly used types
pub use types::*;
pub use engine::compute;
pub use storage::Gateway;
