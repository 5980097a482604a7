//! Game Logic Module
//!
//! Four-in-a-row rules. No I/O and no locking.
//!
//! ## Module Structure
//!
//! - `board`: Grid, piece drops and line detection
//! - `state`: Turn, board snapshot and match phase

pub mod board;
pub mod state;

// Re-export key types
pub use board::{Board, Cell, Color, COLS, ROWS, WIN_LENGTH};
pub use state::{MatchPhase, MatchState};
