// Rows of the shared table store: rooms, players and device users.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::countdown::ROUND_DURATION_MS;
use crate::question::Question;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status `{0}`")]
pub struct UnknownStatus(pub String);

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Active,
    Ended,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Active => "active",
            RoomStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RoomStatus::Waiting),
            "active" => Ok(RoomStatus::Active),
            "ended" => Ok(RoomStatus::Ended),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A shared match context identified by its join code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub code: String,
    pub status: RoomStatus,
    /// Set once per match by whoever starts it; cleared by a rematch.
    pub questions: Option<Vec<Question>>,
    /// Shared epoch (milliseconds) every client counts down against.
    pub game_start_time: Option<i64>,
}

impl Room {
    /// A fresh room waiting for players.
    pub fn waiting(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: RoomStatus::Waiting,
            questions: None,
            game_start_time: None,
        }
    }

    /// When the current round ends, if a match has been started.
    pub fn deadline_ms(&self) -> Option<i64> {
        self.game_start_time.map(|start| start + ROUND_DURATION_MS)
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Joined,
    Playing,
    Finished,
}

impl PlayerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerStatus::Joined => "joined",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joined" => Ok(PlayerStatus::Joined),
            "playing" => Ok(PlayerStatus::Playing),
            "finished" => Ok(PlayerStatus::Finished),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One participant's record within a room. Only the owning client writes
/// score, time and status; everyone else reads it for the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub room_code: String,
    pub name: String,
    pub score: u32,
    /// Milliseconds from round start to this player's finish. `None` until
    /// the player has finished.
    pub time_taken: Option<i64>,
    pub status: PlayerStatus,
}

impl Player {
    pub fn joined(id: impl Into<String>, room_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            room_code: room_code.into(),
            name: name.into(),
            score: 0,
            time_taken: None,
            status: PlayerStatus::Joined,
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Device-scoped profile: one row per browser/device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub device_id: String,
    pub username: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Where a client should go next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum Navigation {
    Lobby { room_code: String },
    Leaderboard { room_code: String },
}

impl Navigation {
    pub fn path(&self) -> String {
        match self {
            Navigation::Lobby { room_code } => format!("/lobby/{room_code}"),
            Navigation::Leaderboard { room_code } => format!("/leaderboard/{room_code}"),
        }
    }
}
