//! Network Layer
//!
//! Connections, matchmaking and match sessions. Game rules live in
//! `game/`; everything here is about who talks to whom.

pub mod transport;
pub mod protocol;
pub mod players;
pub mod queue;
pub mod session;
pub mod router;
pub mod server;

pub use transport::{ConnectionId, Hub, Transport, TransportError};
pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode};
pub use players::{PlayerProfile, PlayerRegistry};
pub use queue::{MatchmakingQueue, QueuedEntrant};
pub use session::{Match, MatchError, MatchId, MoveOutcome, Seat};
pub use router::{DisconnectPolicy, RouterConfig, RouterError, SessionRouter};
pub use server::{GameServer, ServerConfig, GameServerError};
