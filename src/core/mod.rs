//! Core primitives.
//!
//! Pure functions with no I/O or locking.

pub mod rating;

// Re-export core types
pub use rating::{Outcome, DEFAULT_RATING, ELO_K, expected_score, updated_rating, rate_match};
