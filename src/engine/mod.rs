//! Level Engine - pivot structure derived from two session summaries
//!
//! This module contains the pure level computation:
//! - Floor pivots for both sessions and their average
//! - Directional bias from pivot 2 vs pivot 1
//! - Fixed percentage ladder of supply/demand zones around pivot 2
//! - Rule-derived and imported zones, classified against pivot 2

pub mod ladder;
pub mod levels;

// Re-export commonly used items
pub use ladder::{ladder_label, LADDER_PERCENTAGES};
pub use levels::{compute, compute_bias, sort_descending};
