//! Matchmaking Queue
//!
//! Strict FIFO wait list. Arrival order is the only ordering key, so the
//! two longest-waiting entrants are always paired first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::network::transport::ConnectionId;

/// A connection waiting for an opponent.
#[derive(Debug, Clone)]
pub struct QueuedEntrant {
    /// Waiting connection.
    pub connection_id: ConnectionId,
    /// When it joined the queue.
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO matchmaking queue.
pub struct MatchmakingQueue {
    entrants: Mutex<VecDeque<QueuedEntrant>>,
}

impl MatchmakingQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self {
            entrants: Mutex::new(VecDeque::new()),
        }
    }

    /// Append `conn`. Returns false (and leaves the queue untouched) if it
    /// is already waiting.
    pub async fn enqueue(&self, conn: &ConnectionId) -> bool {
        let mut entrants = self.entrants.lock().await;

        if entrants.iter().any(|e| &e.connection_id == conn) {
            warn!(connection = %conn, "player already in queue");
            return false;
        }

        entrants.push_back(QueuedEntrant {
            connection_id: conn.clone(),
            enqueued_at: Utc::now(),
        });
        info!(connection = %conn, queue_size = entrants.len(), "player added to queue");
        true
    }

    /// Remove `conn`. Returns whether it was queued.
    pub async fn dequeue(&self, conn: &ConnectionId) -> bool {
        let mut entrants = self.entrants.lock().await;
        let before = entrants.len();
        entrants.retain(|e| &e.connection_id != conn);

        let removed = entrants.len() < before;
        if removed {
            info!(connection = %conn, queue_size = entrants.len(), "player removed from queue");
        }
        removed
    }

    /// Pop the two longest-waiting entrants, oldest first.
    ///
    /// Both removals happen under one lock, so concurrent callers never
    /// receive overlapping pairs.
    pub async fn try_match(&self) -> Option<(ConnectionId, ConnectionId)> {
        let mut entrants = self.entrants.lock().await;
        if entrants.len() < 2 {
            return None;
        }

        let first = entrants.pop_front()?;
        let second = entrants.pop_front()?;

        let now = Utc::now();
        info!(
            first = %first.connection_id,
            second = %second.connection_id,
            first_waited_ms = (now - first.enqueued_at).num_milliseconds(),
            remaining = entrants.len(),
            "match found",
        );

        Some((first.connection_id, second.connection_id))
    }

    /// Number of waiting entrants.
    pub async fn size(&self) -> usize {
        self.entrants.lock().await.len()
    }

    /// Whether `conn` is waiting.
    pub async fn contains(&self, conn: &ConnectionId) -> bool {
        self.entrants.lock().await.iter().any(|e| &e.connection_id == conn)
    }

    /// Snapshot of the queue in arrival order.
    pub async fn entrants(&self) -> Vec<QueuedEntrant> {
        self.entrants.lock().await.iter().cloned().collect()
    }
}

impl Default for MatchmakingQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use proptest::prelude::*;

    fn conn(n: u8) -> ConnectionId {
        ConnectionId::new(format!("conn-{}", n))
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let queue = MatchmakingQueue::new();
        assert!(queue.enqueue(&conn(1)).await);
        assert!(!queue.enqueue(&conn(1)).await);
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn test_dequeue_missing_is_noop() {
        let queue = MatchmakingQueue::new();
        queue.enqueue(&conn(1)).await;
        assert!(!queue.dequeue(&conn(2)).await);
        assert_eq!(queue.size().await, 1);
        assert!(queue.dequeue(&conn(1)).await);
        assert_eq!(queue.size().await, 0);
    }

    #[tokio::test]
    async fn test_try_match_needs_two() {
        let queue = MatchmakingQueue::new();
        assert!(queue.try_match().await.is_none());
        queue.enqueue(&conn(1)).await;
        assert!(queue.try_match().await.is_none());
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn test_try_match_is_fifo() {
        let queue = MatchmakingQueue::new();
        for n in 1..=5 {
            queue.enqueue(&conn(n)).await;
        }
        queue.dequeue(&conn(2)).await;

        assert_eq!(queue.try_match().await, Some((conn(1), conn(3))));
        assert_eq!(queue.try_match().await, Some((conn(4), conn(5))));
        assert_eq!(queue.try_match().await, None);
    }

    #[tokio::test]
    async fn test_entrants_keep_arrival_order() {
        let queue = MatchmakingQueue::new();
        queue.enqueue(&conn(2)).await;
        queue.enqueue(&conn(1)).await;
        let order: Vec<_> = queue.entrants().await.into_iter().map(|e| e.connection_id).collect();
        assert_eq!(order, vec![conn(2), conn(1)]);
        assert!(queue.contains(&conn(1)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_matching_never_overlaps() {
        use std::sync::Arc;

        let queue = Arc::new(MatchmakingQueue::new());
        for n in 0..40 {
            queue.enqueue(&conn(n)).await;
        }

        let mut handles = Vec::new();
        for _ in 0..30 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move { queue.try_match().await }));
        }

        let mut seen = BTreeSet::new();
        for handle in handles {
            if let Some((a, b)) = handle.await.unwrap() {
                assert!(seen.insert(a));
                assert!(seen.insert(b));
            }
        }
        assert_eq!(seen.len(), 40);
        assert_eq!(queue.size().await, 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(u8),
        Dequeue(u8),
        Match,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8).prop_map(Op::Enqueue),
            (0u8..8).prop_map(Op::Dequeue),
            Just(Op::Match),
        ]
    }

    proptest! {
        #[test]
        fn prop_size_tracks_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let queue = MatchmakingQueue::new();
                let mut model: VecDeque<u8> = VecDeque::new();

                for op in ops {
                    match op {
                        Op::Enqueue(n) => {
                            let added = queue.enqueue(&conn(n)).await;
                            assert_eq!(added, !model.contains(&n));
                            if added {
                                model.push_back(n);
                            }
                        }
                        Op::Dequeue(n) => {
                            let removed = queue.dequeue(&conn(n)).await;
                            assert_eq!(removed, model.contains(&n));
                            model.retain(|m| *m != n);
                        }
                        Op::Match => {
                            let pair = queue.try_match().await;
                            if model.len() >= 2 {
                                let a = model.pop_front().unwrap();
                                let b = model.pop_front().unwrap();
                                assert_eq!(pair, Some((conn(a), conn(b))));
                            } else {
                                assert_eq!(pair, None);
                            }
                        }
                    }
                    assert_eq!(queue.size().await, model.len());
                }
            });
        }
    }
}
