//! Match State Definitions
//!
//! Turn and board of a single match. Only the owning
//! [`Match`](crate::network::session::Match) mutates it.

use serde::{Serialize, Deserialize};

use crate::game::board::{Board, Color};

/// Lifecycle phase of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum MatchPhase {
    /// Created, players not yet notified.
    #[default]
    AwaitingStart,
    /// Accepting moves.
    InProgress,
    /// Ended; no further moves.
    Finished,
}

/// Board plus the color allowed to move next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    /// Color permitted to place the next piece.
    pub turn: Color,
    /// The grid.
    pub board: Board,
}

impl MatchState {
    /// Empty board, red to move.
    pub fn new() -> Self {
        Self {
            turn: Color::Red,
            board: Board::new(),
        }
    }

    /// Hand the turn to the other color.
    pub fn advance_turn(&mut self) {
        self.turn = self.turn.opponent();
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = MatchState::new();
        assert_eq!(state.turn, Color::Red);
        assert_eq!(state.board.piece_count(), 0);
    }

    #[test]
    fn test_advance_turn_alternates() {
        let mut state = MatchState::new();
        state.advance_turn();
        assert_eq!(state.turn, Color::Blue);
        state.advance_turn();
        assert_eq!(state.turn, Color::Red);
    }

    #[test]
    fn test_state_json() {
        let json = serde_json::to_value(MatchState::new()).unwrap();
        assert_eq!(json["turn"], "red");
        assert_eq!(json["board"].as_array().unwrap().len(), 6);
    }
}
