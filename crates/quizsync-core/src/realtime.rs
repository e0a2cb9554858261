// Change notifications for the players table.
//
// The store publishes one `PlayerChange` per mutation. Subscribers filter by
// room code and treat every notification as "reload everything", so the
// payload only needs to say which room changed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// Buffered notifications per subscriber before it starts lagging.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerChange {
    pub room_code: String,
    /// `None` for bulk updates that touch every player in the room.
    pub player_id: Option<String>,
    pub kind: ChangeKind,
}

// ---------------------------------------------------------------------------
// ChangeHub
// ---------------------------------------------------------------------------

/// Fan-out point for player-row changes.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<PlayerChange>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, change: PlayerChange) {
        let _ = self.tx.send(change);
    }

    /// Subscribe to changes for a single room.
    pub fn subscribe(&self, room_code: &str) -> Subscription {
        Subscription {
            room_code: room_code.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A change feed filtered to one room.
#[derive(Debug)]
pub struct Subscription {
    room_code: String,
    rx: broadcast::Receiver<PlayerChange>,
}

impl Subscription {
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// Wait for the next change in this room. Returns `None` once the hub is
    /// gone.
    ///
    /// If the subscriber fell behind and notifications were dropped, a
    /// synthetic bulk update is returned so the caller still reloads.
    pub async fn next(&mut self) -> Option<PlayerChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.room_code == self.room_code => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(room = %self.room_code, skipped, "change subscription lagged");
                    return Some(PlayerChange {
                        room_code: self.room_code.clone(),
                        player_id: None,
                        kind: ChangeKind::Update,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
