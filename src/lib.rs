//! # Four-in-a-Row Game Server
//!
//! Matchmaking and session server for two-player four-in-a-row on a 6×7
//! grid, with Elo ratings and a JSON-over-WebSocket protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FOUR-IN-A-ROW SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Pure helpers                              │
//! │  └── rating.rs   - Elo expected score and updates            │
//! │                                                              │
//! │  game/           - Game rules (no I/O)                       │
//! │  ├── board.rs    - Grid, piece drops, line detection         │
//! │  └── state.rs    - Turn, board and match phase               │
//! │                                                              │
//! │  network/        - Sessions and I/O                          │
//! │  ├── transport.rs- Connection hub and rooms                  │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── players.rs  - Profiles and login bindings               │
//! │  ├── queue.rs    - FIFO matchmaking queue                    │
//! │  ├── session.rs  - Match state machine                       │
//! │  ├── router.rs   - Event routing, active matches             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! The router owns the active matches. A match never holds a reference
//! back to the router; it reports completion over a channel which the
//! router drains at the end of each event.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rating::{Outcome, DEFAULT_RATING, ELO_K};
pub use game::board::{Board, Color, COLS, ROWS, WIN_LENGTH};
pub use game::state::{MatchPhase, MatchState};
pub use network::router::SessionRouter;
pub use network::transport::{ConnectionId, Hub, Transport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
