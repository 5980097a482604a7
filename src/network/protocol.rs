//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged by `"type"`.

use serde::{Serialize, Deserialize};

use crate::game::board::Color;
use crate::game::state::MatchState;
use crate::network::players::PlayerProfile;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind a player identity to this connection.
    Login {
        /// Stable username.
        identity: String,
    },

    /// Request to join matchmaking.
    JoinQueue,

    /// Leave matchmaking.
    LeaveQueue,

    /// Drop a piece into a column.
    PlacePiece {
        /// Target column, expected in `0..=6`.
        column: i32,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current profile of the logged-in player.
    Profile(PlayerProfile),

    /// Paired with an opponent (unicast).
    MatchFound {
        /// Color assigned to the recipient.
        color: Color,
    },

    /// Board and turn after a change (room broadcast).
    GameUpdate(MatchState),

    /// Match over (room broadcast). `None` on a draw.
    GameEnd {
        /// Winning color.
        winner: Option<Color>,
    },

    /// Pong response.
    Pong {
        /// Echo of the ping timestamp.
        timestamp: u64,
        /// Server clock in Unix milliseconds.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error payload.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded.
    InvalidMessage,
    /// Login rejected.
    InvalidIdentity,
    /// Connection limit reached.
    ServerOverloaded,
    /// A paired match was cancelled before it started.
    MatchAborted,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Wire name of the event, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Login { .. } => "login",
            ClientMessage::JoinQueue => "join_queue",
            ClientMessage::LeaveQueue => "leave_queue",
            ClientMessage::PlacePiece { .. } => "place_piece",
            ClientMessage::Ping { .. } => "ping",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
