//! Broadcast hub - fan-out of reconciled updates to observer sessions
//!
//! Sessions are bounded mpsc senders in a guarded registry. `publish`
//! walks the set with try_send: a session whose channel is full or
//! closed is evicted on that failed send and never retried. Join and
//! leave are safe to call concurrently with publish, and there is no
//! queuing or replay for late joiners - new observers only see updates
//! reconciled after their join completes.

use crate::domain::state::DeviceUpdate;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub type SessionId = u64;

/// Per-session buffer: a slow observer this far behind is evicted
const SESSION_BUFFER: usize = 64;

/// Registry of live observer sessions
pub struct Hub {
    sessions: RwLock<HashMap<SessionId, mpsc::Sender<DeviceUpdate>>>,
    next_id: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a new observer session and hand back its update stream
    pub fn join(&self) -> (SessionId, mpsc::Receiver<DeviceUpdate>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.sessions.write().insert(id, tx);
        info!(session_id = %id, sessions = %self.session_count(), "observer_joined");
        (id, rx)
    }

    /// Remove a session. Idempotent: leaving twice is a no-op.
    pub fn leave(&self, id: SessionId) {
        if self.sessions.write().remove(&id).is_some() {
            info!(session_id = %id, sessions = %self.session_count(), "observer_left");
        }
    }

    /// Send an update to every live session, best-effort.
    ///
    /// Returns the number of sessions the update was delivered to.
    pub fn publish(&self, update: &DeviceUpdate) -> usize {
        let mut failed: Vec<SessionId> = Vec::new();
        let mut delivered = 0usize;

        {
            let sessions = self.sessions.read();
            for (&id, tx) in sessions.iter() {
                match tx.try_send(update.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => failed.push(id),
                }
            }
        }

        if !failed.is_empty() {
            let mut sessions = self.sessions.write();
            for id in failed {
                sessions.remove(&id);
                debug!(session_id = %id, "observer_evicted");
            }
        }

        delivered
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::DeviceState;
    use crate::domain::types::DeviceId;

    fn update(device: &str, at: u64) -> DeviceUpdate {
        DeviceUpdate {
            topic: format!("fire_alarm/{}/sensor/flame", device),
            kind: "flame",
            received_at: at,
            state: DeviceState::new(DeviceId::from(device)),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_sessions() {
        let hub = Hub::new();
        let (_id_a, mut rx_a) = hub.join();
        let (_id_b, mut rx_b) = hub.join();

        let delivered = hub.publish(&update("esp32_01", 100));
        assert_eq!(delivered, 2);

        assert_eq!(rx_a.recv().await.unwrap().received_at, 100);
        assert_eq!(rx_b.recv().await.unwrap().received_at, 100);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let hub = Hub::new();
        let (id, _rx) = hub.join();
        assert_eq!(hub.session_count(), 1);

        hub.leave(id);
        hub.leave(id);
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.publish(&update("esp32_01", 100)), 0);
    }

    #[tokio::test]
    async fn test_closed_session_evicted_on_publish() {
        let hub = Hub::new();
        let (_id, rx) = hub.join();
        drop(rx);

        assert_eq!(hub.publish(&update("esp32_01", 100)), 0);
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_backlogged_session_evicted() {
        let hub = Hub::new();
        let (_id, _rx) = hub.join();

        // Never drained: fills the session buffer, then gets evicted
        for i in 0..SESSION_BUFFER {
            assert_eq!(hub.publish(&update("esp32_01", i as u64)), 1);
        }
        assert_eq!(hub.publish(&update("esp32_01", 999)), 0);
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_late_joiner_gets_no_replay() {
        let hub = Hub::new();
        let (_early, mut rx_early) = hub.join();

        hub.publish(&update("esp32_01", 100));

        let (_late, mut rx_late) = hub.join();
        hub.publish(&update("esp32_01", 200));

        assert_eq!(rx_early.recv().await.unwrap().received_at, 100);
        assert_eq!(rx_early.recv().await.unwrap().received_at, 200);
        // The late joiner only sees the update published after it joined
        assert_eq!(rx_late.recv().await.unwrap().received_at, 200);
        assert!(rx_late.try_recv().is_err());
    }
}
