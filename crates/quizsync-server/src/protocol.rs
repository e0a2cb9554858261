// Messages on the realtime leaderboard feed (JSON over WebSocket).

use serde::{Deserialize, Serialize};

use quizsync_core::leaderboard::Standing;

/// Sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving standings for a room, replacing any earlier
    /// subscription on this connection.
    Subscribe { room_code: String },
    Unsubscribe,
}

/// Sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full standings for the subscribed room.
    Standings {
        room_code: String,
        standings: Vec<Standing>,
    },
    Error { message: String },
}
