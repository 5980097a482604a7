//! Board Grid
//!
//! Fixed 6×7 four-in-a-row grid. Row 0 is the bottom row, so pieces
//! dropped into a column land on the lowest empty row.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Number of rows.
pub const ROWS: usize = 6;

/// Number of columns.
pub const COLS: usize = 7;

/// Pieces in a line needed to win.
pub const WIN_LENGTH: usize = 4;

/// Axis pairs scanned by the win check: horizontal, vertical, ↗, ↘.
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (-1, 1)];

// =============================================================================
// COLOR
// =============================================================================

/// Piece / seat color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// Always moves first.
    Red,
    /// Moves second.
    Blue,
}

impl Color {
    /// The other color.
    #[inline]
    pub fn opponent(self) -> Color {
        match self {
            Color::Red => Color::Blue,
            Color::Blue => Color::Red,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => f.write_str("red"),
            Color::Blue => f.write_str("blue"),
        }
    }
}

/// A single cell: empty or holding a piece.
pub type Cell = Option<Color>;

// =============================================================================
// BOARD
// =============================================================================

/// The game grid, indexed `[row][column]`.
///
/// Serializes as a `ROWS`-element array of `COLS`-element arrays of
/// `"red"`, `"blue"` or `null`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Cell; COLS]; ROWS],
}

impl Board {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell at `(row, col)`, `None` when empty or out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Lowest empty row in `col`, or `None` if the column is full or
    /// out of range.
    pub fn landing_row(&self, col: usize) -> Option<usize> {
        if col >= COLS {
            return None;
        }
        (0..ROWS).find(|&row| self.cells[row][col].is_none())
    }

    /// Drop a piece into `col`. Returns the row it landed on.
    ///
    /// Occupied cells are never touched; a full column returns `None`
    /// and leaves the board unchanged.
    pub fn drop_piece(&mut self, col: usize, color: Color) -> Option<usize> {
        let row = self.landing_row(col)?;
        self.cells[row][col] = Some(color);
        Some(row)
    }

    /// True when every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells[ROWS - 1].iter().all(Option::is_some)
    }

    /// Number of occupied cells.
    pub fn piece_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Length of the run through `(row, col)` along `(d_row, d_col)`,
    /// counting both directions and the cell itself.
    pub fn run_length(&self, row: usize, col: usize, d_row: isize, d_col: isize) -> usize {
        let Some(color) = self.get(row, col) else {
            return 0;
        };
        1 + self.count_direction(row, col, d_row, d_col, color)
            + self.count_direction(row, col, -d_row, -d_col, color)
    }

    /// Whether the piece at `(row, col)` completes a line of four.
    pub fn is_winning_cell(&self, row: usize, col: usize) -> bool {
        AXES.iter()
            .any(|&(dr, dc)| self.run_length(row, col, dr, dc) >= WIN_LENGTH)
    }

    /// Build a board from text rows, bottom row first: `R`, `B` or `.`.
    #[cfg(test)]
    pub(crate) fn from_pattern(rows: [&str; ROWS]) -> Self {
        let mut board = Board::new();
        for (r, line) in rows.iter().enumerate() {
            for (c, ch) in line.chars().take(COLS).enumerate() {
                board.cells[r][c] = match ch {
                    'R' => Some(Color::Red),
                    'B' => Some(Color::Blue),
                    _ => None,
                };
            }
        }
        board
    }

    fn count_direction(&self, row: usize, col: usize, d_row: isize, d_col: isize, color: Color) -> usize {
        let mut count = 0;
        let mut r = row as isize + d_row;
        let mut c = col as isize + d_col;
        while (0..ROWS as isize).contains(&r)
            && (0..COLS as isize).contains(&c)
            && self.cells[r as usize][c as usize] == Some(color)
        {
            count += 1;
            r += d_row;
            c += d_col;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        assert_eq!(board.piece_count(), 0);
        assert!(!board.is_full());
        for col in 0..COLS {
            assert_eq!(board.landing_row(col), Some(0));
        }
    }

    #[test]
    fn test_pieces_stack_from_bottom() {
        let mut board = Board::new();
        assert_eq!(board.drop_piece(3, Color::Red), Some(0));
        assert_eq!(board.drop_piece(3, Color::Blue), Some(1));
        assert_eq!(board.get(0, 3), Some(Color::Red));
        assert_eq!(board.get(1, 3), Some(Color::Blue));
        assert_eq!(board.get(2, 3), None);
    }

    #[test]
    fn test_full_column_rejects_piece() {
        let mut board = Board::new();
        for i in 0..ROWS {
            let color = if i % 2 == 0 { Color::Red } else { Color::Blue };
            assert_eq!(board.drop_piece(0, color), Some(i));
        }
        let before = board;
        assert_eq!(board.drop_piece(0, Color::Red), None);
        assert_eq!(board, before);
    }

    #[test]
    fn test_out_of_range_column() {
        let mut board = Board::new();
        assert_eq!(board.landing_row(COLS), None);
        assert_eq!(board.drop_piece(COLS, Color::Red), None);
        assert_eq!(board.piece_count(), 0);
    }

    #[test]
    fn test_horizontal_win() {
        let mut board = Board::new();
        for col in 0..3 {
            board.drop_piece(col, Color::Red);
            assert!(!board.is_winning_cell(0, col));
        }
        board.drop_piece(3, Color::Red);
        assert!(board.is_winning_cell(0, 3));
        // Any cell of the line sees the whole run.
        assert_eq!(board.run_length(0, 1, 0, 1), 4);
    }

    #[test]
    fn test_vertical_win() {
        let mut board = Board::new();
        for _ in 0..4 {
            board.drop_piece(6, Color::Blue);
        }
        assert!(board.is_winning_cell(3, 6));
    }

    #[test]
    fn test_diagonal_up_right_win() {
        let mut board = Board::new();
        // Staircase: column c gets c fillers then a red piece.
        for col in 0..4 {
            for _ in 0..col {
                board.drop_piece(col, Color::Blue);
            }
            board.drop_piece(col, Color::Red);
        }
        assert!(board.is_winning_cell(3, 3));
        assert!(board.is_winning_cell(0, 0));
    }

    #[test]
    fn test_diagonal_down_right_win() {
        let mut board = Board::new();
        for col in 0..4 {
            for _ in 0..(3 - col) {
                board.drop_piece(col, Color::Blue);
            }
            board.drop_piece(col, Color::Red);
        }
        assert_eq!(board.get(3, 0), Some(Color::Red));
        assert_eq!(board.get(0, 3), Some(Color::Red));
        assert!(board.is_winning_cell(0, 3));
    }

    #[test]
    fn test_broken_line_is_not_a_win() {
        let mut board = Board::new();
        board.drop_piece(0, Color::Red);
        board.drop_piece(1, Color::Red);
        board.drop_piece(2, Color::Blue);
        board.drop_piece(3, Color::Red);
        board.drop_piece(4, Color::Red);
        assert!(!board.is_winning_cell(0, 3));
        assert!(!board.is_winning_cell(0, 1));
    }

    #[test]
    fn test_full_board_without_line() {
        let board = Board::from_pattern([
            "BRBRBBR",
            "RRBBBRB",
            "BBRBBBR",
            "RRRBRRR",
            "BRRRBRB",
            "BRBRBRB",
        ]);
        assert!(board.is_full());
        assert_eq!(board.piece_count(), ROWS * COLS);
        for row in 0..ROWS {
            for col in 0..COLS {
                assert!(!board.is_winning_cell(row, col), "unexpected line at ({}, {})", row, col);
            }
        }
    }

    #[test]
    fn test_empty_cell_has_no_run() {
        let board = Board::new();
        assert_eq!(board.run_length(2, 2, 0, 1), 0);
    }

    #[test]
    fn test_board_json_shape() {
        let mut board = Board::new();
        board.drop_piece(0, Color::Red);
        let json = serde_json::to_value(board).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), ROWS);
        assert_eq!(rows[0].as_array().unwrap().len(), COLS);
        assert_eq!(rows[0][0], "red");
        assert!(rows[0][1].is_null());
    }
}
