//! Session Router
//!
//! Binds inbound per-connection events to the player registry, the
//! matchmaking queue and running matches, and owns the active-match
//! registry.
//!
//! Lock order is registry → queue → match → players. The registry lock is
//! always released before a match is locked.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::network::players::PlayerRegistry;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::queue::MatchmakingQueue;
use crate::network::session::{CompletionSender, Match, MatchError, MatchId, Seat};
use crate::network::transport::{ConnectionId, Transport, TransportError};

/// What happens to a running match when one participant disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// Log only; the match keeps running.
    #[default]
    Continue,
    /// The remaining player wins and ratings are updated.
    Forfeit,
}

impl FromStr for DisconnectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(DisconnectPolicy::Continue),
            "forfeit" => Ok(DisconnectPolicy::Forfeit),
            other => Err(format!("unknown disconnect policy: {}", other)),
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Disconnect handling for seated players.
    pub disconnect_policy: DisconnectPolicy,
}

/// Router errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Match failure that is not a plain rejection.
    #[error("Match error: {0}")]
    Match(#[from] MatchError),
}

/// Registry entry for a running match.
struct ActiveMatch {
    handle: Arc<Mutex<Match>>,
    connections: [ConnectionId; 2],
}

/// Active matches plus the connection → match side index.
#[derive(Default)]
struct MatchTable {
    matches: BTreeMap<MatchId, ActiveMatch>,
    by_connection: BTreeMap<ConnectionId, MatchId>,
}

impl MatchTable {
    fn insert(&mut self, id: MatchId, entry: ActiveMatch) {
        for conn in &entry.connections {
            self.by_connection.insert(conn.clone(), id);
        }
        self.matches.insert(id, entry);
    }

    fn remove(&mut self, id: &MatchId) -> bool {
        let Some(entry) = self.matches.remove(id) else {
            return false;
        };
        for conn in &entry.connections {
            if self.by_connection.get(conn) == Some(id) {
                self.by_connection.remove(conn);
            }
        }
        true
    }

    fn find(&self, conn: &ConnectionId) -> Option<(MatchId, Arc<Mutex<Match>>)> {
        let id = self.by_connection.get(conn)?;
        self.matches.get(id).map(|m| (*id, m.handle.clone()))
    }
}

/// Top-level event router.
pub struct SessionRouter {
    config: RouterConfig,
    players: Arc<PlayerRegistry>,
    queue: MatchmakingQueue,
    transport: Arc<dyn Transport>,
    active: RwLock<MatchTable>,
    completed_tx: CompletionSender,
    completed_rx: Mutex<mpsc::UnboundedReceiver<MatchId>>,
}

impl SessionRouter {
    /// Create a router over shared players and transport.
    pub fn new(config: RouterConfig, players: Arc<PlayerRegistry>, transport: Arc<dyn Transport>) -> Self {
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();

        Self {
            config,
            players,
            queue: MatchmakingQueue::new(),
            transport,
            active: RwLock::new(MatchTable::default()),
            completed_tx,
            completed_rx: Mutex::new(completed_rx),
        }
    }

    /// Dispatch one inbound event.
    ///
    /// This is the per-event error boundary: failures are logged and
    /// never reach other connections.
    pub async fn handle(&self, conn: &ConnectionId, message: ClientMessage) {
        let event = message.event_name();

        let result = match message {
            ClientMessage::Login { identity } => self.on_login(&identity, conn).await,
            ClientMessage::JoinQueue => self.on_join_queue(conn).await,
            ClientMessage::LeaveQueue => self.on_leave_queue(conn).await,
            ClientMessage::PlacePiece { column } => self.on_place_piece(conn, column).await,
            ClientMessage::Ping { timestamp } => self.on_ping(conn, timestamp).await,
        };

        if let Err(e) = result {
            error!(connection = %conn, event, error = %e, "error in event handler");
        }
    }

    /// Bind `identity` to `conn` and send its profile.
    pub async fn on_login(&self, identity: &str, conn: &ConnectionId) -> Result<(), RouterError> {
        let identity = identity.trim();
        if identity.is_empty() {
            warn!(connection = %conn, "login with blank identity rejected");
            self.transport.send(conn, ServerMessage::Error(
                ServerError::new(ErrorCode::InvalidIdentity, "Identity must not be blank"),
            )).await?;
            return Ok(());
        }

        let profile = self.players.get_or_create(identity).await;
        self.players.bind(conn, identity).await;
        info!(connection = %conn, identity, rating = profile.rating, "player logged in");

        self.transport.send(conn, ServerMessage::Profile(profile)).await?;
        Ok(())
    }

    /// Queue `conn` and pair the two longest-waiting entrants if possible.
    pub async fn on_join_queue(&self, conn: &ConnectionId) -> Result<(), RouterError> {
        info!(connection = %conn, "player requesting to join queue");

        // A match that already announced its result may not be reaped yet.
        self.reap_finished().await;

        {
            // Held across the enqueue so pairing cannot interleave.
            let table = self.active.read().await;
            if let Some(match_id) = table.by_connection.get(conn) {
                warn!(connection = %conn, %match_id, "player already in an active game");
                return Ok(());
            }
            self.queue.enqueue(conn).await;
        }

        self.try_create_match().await
    }

    /// Remove `conn` from the queue.
    pub async fn on_leave_queue(&self, conn: &ConnectionId) -> Result<(), RouterError> {
        info!(connection = %conn, "player requesting to leave queue");

        if !self.queue.dequeue(conn).await {
            warn!(connection = %conn, "player not found in queue when trying to leave");
        }
        Ok(())
    }

    /// Forward a move to the match `conn` is seated in.
    pub async fn on_place_piece(&self, conn: &ConnectionId, column: i32) -> Result<(), RouterError> {
        debug!(connection = %conn, column, "player attempting to place piece");

        let found = self.active.read().await.find(conn);
        let Some((match_id, handle)) = found else {
            warn!(connection = %conn, "player not in any active game");
            return Ok(());
        };

        let result = handle.lock().await.place_piece(conn, column).await;
        self.reap_finished().await;

        match result {
            Ok(outcome) if outcome.is_final() => {
                info!(connection = %conn, %match_id, ?outcome, "final move played");
                Ok(())
            }
            Ok(outcome) => {
                debug!(connection = %conn, %match_id, ?outcome, "piece accepted");
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                warn!(connection = %conn, %match_id, column, reason = %e, "failed to place piece");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Connection closed: leave the queue, drop the login binding and apply
    /// the disconnect policy to any running match.
    pub async fn on_disconnect(&self, conn: &ConnectionId) -> Result<(), RouterError> {
        info!(connection = %conn, "player disconnected");

        self.queue.dequeue(conn).await;
        self.players.unbind(conn).await;

        let found = self.active.read().await.find(conn);
        let Some((match_id, handle)) = found else {
            return Ok(());
        };

        match self.config.disconnect_policy {
            DisconnectPolicy::Continue => {
                warn!(connection = %conn, %match_id, "player disconnected from active game, match continues");
                Ok(())
            }
            DisconnectPolicy::Forfeit => {
                let result = handle.lock().await.forfeit(conn).await;
                self.reap_finished().await;

                match result {
                    Ok(winner) => {
                        info!(connection = %conn, %match_id, %winner, "disconnect counted as forfeit");
                        Ok(())
                    }
                    Err(e) if e.is_rejection() => {
                        debug!(connection = %conn, %match_id, reason = %e, "forfeit skipped");
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Reply to a ping.
    pub async fn on_ping(&self, conn: &ConnectionId, timestamp: u64) -> Result<(), RouterError> {
        let server_time = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.transport.send(conn, ServerMessage::Pong { timestamp, server_time }).await?;
        Ok(())
    }

    async fn try_create_match(&self) -> Result<(), RouterError> {
        let handle = {
            let mut table = self.active.write().await;

            let Some((first, second)) = self.queue.try_match().await else {
                return Ok(());
            };

            let red_profile = self.players.lookup_by_connection(&first).await;
            let blue_profile = self.players.lookup_by_connection(&second).await;

            let (Some(red_profile), Some(blue_profile)) = (red_profile, blue_profile) else {
                error!(
                    first = %first,
                    second = %second,
                    "players not logged in, pairing dropped",
                );
                return Ok(());
            };

            let game = Match::new(
                Seat::new(first, red_profile),
                Seat::new(second, blue_profile),
                self.players.clone(),
                self.transport.clone(),
                self.completed_tx.clone(),
            );
            let id = game.id();
            let connections = game.connections();
            let handle = Arc::new(Mutex::new(game));

            table.insert(id, ActiveMatch { handle: handle.clone(), connections });
            handle
        };

        let mut game = handle.lock().await;
        match game.start().await {
            Ok(()) => {
                info!(match_id = %game.id(), room = %game.room_id(), "game started successfully");
                Ok(())
            }
            Err(e) => {
                game.abort().await;
                drop(game);
                self.reap_finished().await;

                if let MatchError::MissingParticipant(_) = e {
                    warn!(reason = %e, "match abandoned before start");
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Drop every match that reported completion.
    async fn reap_finished(&self) {
        let finished: Vec<MatchId> = {
            let mut rx = self.completed_rx.lock().await;
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };

        if finished.is_empty() {
            return;
        }

        let mut table = self.active.write().await;
        for id in finished {
            if table.remove(&id) {
                info!(match_id = %id, "game cleaned up");
            }
        }
    }

    /// Number of waiting entrants.
    pub async fn queue_size(&self) -> usize {
        self.queue.size().await
    }

    /// Number of registered matches.
    pub async fn active_match_count(&self) -> usize {
        self.active.read().await.matches.len()
    }

    /// Match `conn` is seated in.
    pub async fn match_of(&self, conn: &ConnectionId) -> Option<MatchId> {
        self.active.read().await.by_connection.get(conn).copied()
    }

    /// Shared player registry.
    pub fn players(&self) -> &Arc<PlayerRegistry> {
        &self.players
    }
}
