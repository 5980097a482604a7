//! Player Registry
//!
//! Player identities and ratings, plus the connection → identity binding
//! recorded at login. Profiles live for the whole process and are never
//! removed.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::rating::{rate_match, Outcome, DEFAULT_RATING};
use crate::network::transport::ConnectionId;

/// Identity and rating of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Stable username.
    pub identity: String,
    /// Elo rating.
    pub rating: i32,
}

impl PlayerProfile {
    /// New profile at the default rating.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            rating: DEFAULT_RATING,
        }
    }
}

/// All known players.
pub struct PlayerRegistry {
    /// Profiles keyed by identity.
    profiles: RwLock<BTreeMap<String, PlayerProfile>>,
    /// Most recent identity seen on each connection.
    bindings: RwLock<BTreeMap<ConnectionId, String>>,
}

impl PlayerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(BTreeMap::new()),
            bindings: RwLock::new(BTreeMap::new()),
        }
    }

    /// Existing profile for `identity`, or a new one at the default rating.
    pub async fn get_or_create(&self, identity: &str) -> PlayerProfile {
        let mut profiles = self.profiles.write().await;
        profiles.entry(identity.to_string())
            .or_insert_with(|| {
                info!(identity, "created player profile");
                PlayerProfile::new(identity)
            })
            .clone()
    }

    /// Profile for `identity`, if any.
    pub async fn get(&self, identity: &str) -> Option<PlayerProfile> {
        self.profiles.read().await.get(identity).cloned()
    }

    /// Overwrite the stored rating.
    pub async fn set_rating(&self, identity: &str, rating: i32) {
        let mut profiles = self.profiles.write().await;
        profiles.entry(identity.to_string())
            .or_insert_with(|| PlayerProfile::new(identity))
            .rating = rating;
    }

    /// Record `identity` as the player behind `conn`.
    pub async fn bind(&self, conn: &ConnectionId, identity: &str) {
        let previous = self.bindings.write().await.insert(conn.clone(), identity.to_string());
        if let Some(previous) = previous.filter(|p| p != identity) {
            debug!(connection = %conn, previous = %previous, identity, "connection rebound to new identity");
        }
    }

    /// Forget the binding for `conn`. The profile is kept.
    pub async fn unbind(&self, conn: &ConnectionId) {
        self.bindings.write().await.remove(conn);
    }

    /// Identity bound to `conn`.
    pub async fn identity_of(&self, conn: &ConnectionId) -> Option<String> {
        self.bindings.read().await.get(conn).cloned()
    }

    /// Profile of the player bound to `conn`.
    pub async fn lookup_by_connection(&self, conn: &ConnectionId) -> Option<PlayerProfile> {
        let identity = self.identity_of(conn).await?;
        self.get(&identity).await
    }

    /// Apply the rating update for a finished match and return both
    /// refreshed profiles as `(red, blue)`.
    ///
    /// `outcome` is seen from red. A player matched against their own
    /// identity keeps their rating.
    pub async fn apply_result(&self, red: &str, blue: &str, outcome: Outcome) -> (PlayerProfile, PlayerProfile) {
        let mut profiles = self.profiles.write().await;

        let red_rating = profiles.get(red).map_or(DEFAULT_RATING, |p| p.rating);
        let blue_rating = profiles.get(blue).map_or(DEFAULT_RATING, |p| p.rating);

        let (new_red, new_blue) = if red == blue {
            warn!(identity = red, "player matched against own identity, rating unchanged");
            (red_rating, blue_rating)
        } else {
            rate_match(red_rating, blue_rating, outcome)
        };

        for (identity, rating) in [(red, new_red), (blue, new_blue)] {
            profiles.entry(identity.to_string())
                .or_insert_with(|| PlayerProfile::new(identity))
                .rating = rating;
        }

        info!(red, blue, red_rating = new_red, blue_rating = new_blue, ?outcome, "ratings updated");

        (
            PlayerProfile { identity: red.to_string(), rating: new_red },
            PlayerProfile { identity: blue.to_string(), rating: new_blue },
        )
    }

    /// Number of known profiles.
    pub async fn profile_count(&self) -> usize {
        self.profiles.read().await.len()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
