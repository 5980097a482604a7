//! Elo Rating
//!
//! Integer skill ratings updated once per finished match.
//!
//! ```text
//! expected = 1 / (1 + 10^((opponent - own) / 400))
//! new      = round(own + K * (score - expected))
//! ```
//!
//! `score` is 1.0 for a win, 0.0 for a loss and 0.5 for a draw.

/// Rating assigned to a freshly created profile.
pub const DEFAULT_RATING: i32 = 1000;

/// Elo K-factor (maximum swing per match).
pub const ELO_K: f64 = 32.0;

/// Result of a match from the first player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First player won.
    Win,
    /// First player lost.
    Loss,
    /// Nobody won.
    Draw,
}

impl Outcome {
    /// Actual score used in the Elo formula.
    #[inline]
    pub fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
            Outcome::Draw => 0.5,
        }
    }

    /// Same result seen from the other player.
    pub fn reversed(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

/// Probability that a player rated `own` beats one rated `opponent`.
#[inline]
pub fn expected_score(own: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - own) as f64 / 400.0))
}

/// New rating for a single player.
pub fn updated_rating(own: i32, opponent: i32, outcome: Outcome) -> i32 {
    let delta = ELO_K * (outcome.score() - expected_score(own, opponent));
    (own as f64 + delta).round() as i32
}

/// New ratings for both players of a finished match.
///
/// `outcome` is seen from player `a`. Both results are computed from the
/// ratings before the match.
pub fn rate_match(a: i32, b: i32, outcome: Outcome) -> (i32, i32) {
    (
        updated_rating(a, b, outcome),
        updated_rating(b, a, outcome.reversed()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_score_even() {
        assert!((expected_score(1000, 1000) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_expected_scores_sum_to_one() {
        let a = expected_score(1200, 1000);
        let b = expected_score(1000, 1200);
        assert!((a + b - 1.0).abs() < 1e-12);
        assert!(a > b);
    }

    #[test]
    fn test_even_match_win() {
        let (winner, loser) = rate_match(1000, 1000, Outcome::Win);
        assert_eq!(winner, 1016);
        assert_eq!(loser, 984);
    }

    #[test]
    fn test_even_match_loss_is_mirrored() {
        let (loser, winner) = rate_match(1000, 1000, Outcome::Loss);
        assert_eq!(winner, 1016);
        assert_eq!(loser, 984);
    }

    #[test]
    fn test_even_match_draw_is_unchanged() {
        assert_eq!(rate_match(1000, 1000, Outcome::Draw), (1000, 1000));
    }

    #[test]
    fn test_upset_moves_more_points() {
        // Underdog beats favourite: gains more than 16.
        let (underdog, favourite) = rate_match(1000, 1400, Outcome::Win);
        assert!(underdog - 1000 > 16);
        assert!(1400 - favourite > 16);

        // Favourite beats underdog: gains less than 16.
        let (favourite, _) = rate_match(1400, 1000, Outcome::Win);
        assert!(favourite - 1400 < 16);
    }

    #[test]
    fn test_draw_between_unequal_players() {
        let (low, high) = rate_match(1000, 1200, Outcome::Draw);
        assert!(low > 1000);
        assert!(high < 1200);
    }
}
