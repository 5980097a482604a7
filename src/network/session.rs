//! Match Session
//!
//! One two-player game from pairing to completion.
//!
//! ```text
//! AwaitingStart ──start()──▶ InProgress ──win / full board / forfeit──▶ Finished
//! ```
//!
//! The match owns its board exclusively. When it finishes it leaves its
//! room and reports its id on the completion channel; the router drains
//! that channel and drops the match from the active registry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::rating::Outcome;
use crate::game::board::{Color, COLS};
use crate::game::state::{MatchPhase, MatchState};
use crate::network::players::{PlayerProfile, PlayerRegistry};
use crate::network::protocol::{ErrorCode, ServerError, ServerMessage};
use crate::network::transport::{ConnectionId, Transport, TransportError};

/// Unique match identifier.
pub type MatchId = Uuid;

/// Sender half of the completion channel.
pub type CompletionSender = mpsc::UnboundedSender<MatchId>;

/// One side of the board.
#[derive(Debug, Clone)]
pub struct Seat {
    /// Connection driving this side.
    pub connection_id: ConnectionId,
    /// Player profile at pairing time, refreshed at match end.
    pub profile: PlayerProfile,
}

impl Seat {
    /// Seat for `connection_id` played by `profile`.
    pub fn new(connection_id: ConnectionId, profile: PlayerProfile) -> Self {
        Self { connection_id, profile }
    }
}

/// Result of an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Piece placed, turn passed to the opponent.
    Placed {
        /// Mover.
        color: Color,
        /// Landing row.
        row: usize,
        /// Column.
        column: usize,
    },
    /// Piece placed and completed a line of four.
    Won {
        /// Winner.
        winner: Color,
        /// Landing row.
        row: usize,
        /// Column.
        column: usize,
    },
    /// Piece filled the last empty cell without a line.
    Draw,
}

impl MoveOutcome {
    /// Whether the move ended the match.
    pub fn is_final(&self) -> bool {
        !matches!(self, MoveOutcome::Placed { .. })
    }
}

/// Match errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Operation requires another phase.
    #[error("Invalid match phase: {0:?}")]
    InvalidPhase(MatchPhase),

    /// Moves are only accepted while the match is running.
    #[error("Match not in progress")]
    NotInProgress,

    /// Connection is not seated in this match.
    #[error("Connection {0} is not a participant")]
    NotParticipant(ConnectionId),

    /// It is the other color's turn.
    #[error("Not your turn, {expected} to move")]
    WrongTurn {
        /// Color whose turn it is.
        expected: Color,
    },

    /// Column outside `0..=6`.
    #[error("Column {0} out of range")]
    ColumnOutOfRange(i32),

    /// Column has no empty cell.
    #[error("Column {0} is full")]
    ColumnFull(usize),

    /// A participant left before the match could start.
    #[error("Participant {0} is not connected")]
    MissingParticipant(ConnectionId),

    /// Transport failure while notifying players.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl MatchError {
    /// True for rejected moves, which never change the match.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            MatchError::NotInProgress
                | MatchError::NotParticipant(_)
                | MatchError::WrongTurn { .. }
                | MatchError::ColumnOutOfRange(_)
                | MatchError::ColumnFull(_)
        )
    }
}

/// A single two-player match.
pub struct Match {
    /// Unique match identifier.
    id: MatchId,
    /// Transport room holding both connections.
    room_id: String,
    /// Moves first.
    red: Seat,
    /// Moves second.
    blue: Seat,
    /// Lifecycle phase.
    phase: MatchPhase,
    /// Board and turn.
    state: MatchState,
    /// Rating store.
    players: Arc<PlayerRegistry>,
    /// Outbound messages.
    transport: Arc<dyn Transport>,
    /// Completion notifications to the router.
    completed: CompletionSender,
    /// Whether completion has been reported.
    reported: bool,
    /// Seats already sent `match_found`.
    announced: Vec<Color>,
}

impl Match {
    /// Create a match waiting to start.
    pub fn new(
        red: Seat,
        blue: Seat,
        players: Arc<PlayerRegistry>,
        transport: Arc<dyn Transport>,
        completed: CompletionSender,
    ) -> Self {
        let id = Uuid::new_v4();
        let room_id = format!("game-{}", Uuid::new_v4());

        info!(
            match_id = %id,
            room = %room_id,
            red = %red.profile.identity,
            blue = %blue.profile.identity,
            "match created",
        );

        Self {
            id,
            room_id,
            red,
            blue,
            phase: MatchPhase::AwaitingStart,
            state: MatchState::new(),
            players,
            transport,
            completed,
            reported: false,
            announced: Vec::new(),
        }
    }

    /// Notify both players and open the match for moves.
    ///
    /// Fails fast without emitting anything if either connection is gone;
    /// the match then stays in `AwaitingStart`.
    pub async fn start(&mut self) -> Result<(), MatchError> {
        if self.phase != MatchPhase::AwaitingStart {
            return Err(MatchError::InvalidPhase(self.phase));
        }

        for seat in [&self.red, &self.blue] {
            if !self.transport.is_connected(&seat.connection_id).await {
                warn!(
                    match_id = %self.id,
                    connection = %seat.connection_id,
                    "participant gone before match start",
                );
                return Err(MatchError::MissingParticipant(seat.connection_id.clone()));
            }
        }

        // Room membership is settled for both seats before anyone is told.
        for seat in [&self.red, &self.blue] {
            self.transport.join(&seat.connection_id, &self.room_id).await?;
        }

        for (seat, color) in [(&self.red, Color::Red), (&self.blue, Color::Blue)] {
            self.transport.send(&seat.connection_id, ServerMessage::MatchFound { color }).await?;
            self.announced.push(color);
        }

        self.publish_state().await?;
        self.phase = MatchPhase::InProgress;

        info!(match_id = %self.id, room = %self.room_id, "match started");
        Ok(())
    }

    /// Drop a piece for `conn` into `column`.
    ///
    /// Rejected moves leave the board and turn untouched.
    pub async fn place_piece(&mut self, conn: &ConnectionId, column: i32) -> Result<MoveOutcome, MatchError> {
        if self.phase != MatchPhase::InProgress {
            return Err(MatchError::NotInProgress);
        }

        let color = self.color_of(conn)
            .ok_or_else(|| MatchError::NotParticipant(conn.clone()))?;

        if color != self.state.turn {
            return Err(MatchError::WrongTurn { expected: self.state.turn });
        }

        let col = usize::try_from(column)
            .ok()
            .filter(|c| *c < COLS)
            .ok_or(MatchError::ColumnOutOfRange(column))?;

        let row = self.state.board.drop_piece(col, color)
            .ok_or(MatchError::ColumnFull(col))?;

        debug!(match_id = %self.id, %color, row, column = col, "piece placed");

        let outcome = if self.state.board.is_winning_cell(row, col) {
            MoveOutcome::Won { winner: color, row, column: col }
        } else if self.state.board.is_full() {
            MoveOutcome::Draw
        } else {
            self.state.advance_turn();
            MoveOutcome::Placed { color, row, column: col }
        };

        let published = self.publish_state().await;

        match outcome {
            MoveOutcome::Won { winner, .. } => self.end_game(Some(winner)).await?,
            MoveOutcome::Draw => self.end_game(None).await?,
            MoveOutcome::Placed { .. } => {}
        }

        published?;
        Ok(outcome)
    }

    /// Concede for `conn`; the other side wins. Returns the winner.
    pub async fn forfeit(&mut self, conn: &ConnectionId) -> Result<Color, MatchError> {
        if self.phase != MatchPhase::InProgress {
            return Err(MatchError::NotInProgress);
        }

        let loser = self.color_of(conn)
            .ok_or_else(|| MatchError::NotParticipant(conn.clone()))?;
        let winner = loser.opponent();

        info!(match_id = %self.id, connection = %conn, %winner, "match forfeited");
        self.end_game(Some(winner)).await?;
        Ok(winner)
    }

    /// Update ratings, report completion, then announce the result and
    /// release the room.
    ///
    /// Completion is reported before `game_end` goes out, so a player who
    /// reacts to it is already free to queue again. Ratings and cleanup are
    /// applied even if notifying players fails; the first transport error
    /// is returned afterwards.
    async fn end_game(&mut self, winner: Option<Color>) -> Result<(), MatchError> {
        let outcome = match winner {
            Some(Color::Red) => Outcome::Win,
            Some(Color::Blue) => Outcome::Loss,
            None => Outcome::Draw,
        };

        let (red, blue) = self.players
            .apply_result(&self.red.profile.identity, &self.blue.profile.identity, outcome)
            .await;
        self.red.profile = red;
        self.blue.profile = blue;
        self.phase = MatchPhase::Finished;
        self.report_completion();

        let mut result = self.transport
            .broadcast(&self.room_id, ServerMessage::GameEnd { winner })
            .await;

        for seat in [&self.red, &self.blue] {
            if self.transport.is_connected(&seat.connection_id).await {
                let sent = self.transport
                    .send(&seat.connection_id, ServerMessage::Profile(seat.profile.clone()))
                    .await;
                result = result.and(sent);
            }
        }

        match winner {
            Some(color) => info!(match_id = %self.id, winner = %color, "match ended"),
            None => info!(match_id = %self.id, "match ended in a draw"),
        }

        self.cleanup().await;

        result.map_err(MatchError::from)
    }

    /// Tear down a match whose start failed. Seats already told about the
    /// match get an error so they know to queue again.
    pub async fn abort(&mut self) {
        for color in std::mem::take(&mut self.announced) {
            let conn = match color {
                Color::Red => &self.red.connection_id,
                Color::Blue => &self.blue.connection_id,
            };
            if !self.transport.is_connected(conn).await {
                continue;
            }
            let notice = ServerMessage::Error(ServerError::new(
                ErrorCode::MatchAborted,
                "Opponent unavailable, match cancelled",
            ));
            if let Err(e) = self.transport.send(conn, notice).await {
                debug!(match_id = %self.id, connection = %conn, error = %e, "abort notice not delivered");
            }
        }

        warn!(match_id = %self.id, "match aborted before start");
        self.cleanup().await;
    }

    /// Remove both connections from the room and report completion.
    pub async fn cleanup(&mut self) {
        for seat in [&self.red, &self.blue] {
            self.transport.leave(&seat.connection_id, &self.room_id).await;
        }

        self.report_completion();
        debug!(match_id = %self.id, "match cleaned up");
    }

    fn report_completion(&mut self) {
        if self.reported {
            return;
        }
        self.reported = true;

        if self.completed.send(self.id).is_err() {
            debug!(match_id = %self.id, "completion receiver dropped");
        }
    }

    async fn publish_state(&self) -> Result<(), TransportError> {
        self.transport
            .broadcast(&self.room_id, ServerMessage::GameUpdate(self.state))
            .await
    }

    /// Color seated at `conn`.
    pub fn color_of(&self, conn: &ConnectionId) -> Option<Color> {
        if &self.red.connection_id == conn {
            Some(Color::Red)
        } else if &self.blue.connection_id == conn {
            Some(Color::Blue)
        } else {
            None
        }
    }

    /// Both participant connections, red first.
    pub fn connections(&self) -> [ConnectionId; 2] {
        [self.red.connection_id.clone(), self.blue.connection_id.clone()]
    }

    /// Match id.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Room id.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Board and turn.
    pub fn state(&self) -> &MatchState {
        &self.state
    }
}
