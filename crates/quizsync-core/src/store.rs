// The table store seam: rooms, players and users plus the players change feed.
//
// Everything a client or the HTTP API does to shared state goes through this
// trait. `crate::db::Database` is the SQLite implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::question::Question;
use crate::realtime::Subscription;
use crate::room::{Player, PlayerStatus, Room, User};

pub trait TableStore: Send + Sync {
    // -- rooms --

    fn insert_room(&self, room: &Room) -> Result<()>;

    fn get_room(&self, code: &str) -> Result<Option<Room>>;

    /// Move a `waiting` room to `active` with the given questions and shared
    /// start time. Returns `false` (and changes nothing) if the room was not
    /// waiting, so the first writer's start time stays authoritative.
    fn start_room(&self, code: &str, questions: &[Question], start_ms: i64) -> Result<bool>;

    /// Return a started or ended room to `waiting`, clearing its questions and
    /// start time. Returns `false` if the room was already waiting.
    fn reset_room(&self, code: &str) -> Result<bool>;

    /// Mark an `active` room as `ended`. Returns `false` otherwise.
    fn end_room(&self, code: &str) -> Result<bool>;

    // -- players --

    fn insert_player(&self, player: &Player) -> Result<()>;

    fn get_player(&self, id: &str) -> Result<Option<Player>>;

    fn delete_player(&self, id: &str) -> Result<bool>;

    /// All players in a room, best first: score descending, then time taken
    /// ascending with unfinished players last.
    fn list_players(&self, room_code: &str) -> Result<Vec<Player>>;

    /// Write a finished player's score and time. Returns `false` if no such
    /// player exists.
    fn record_result(&self, player_id: &str, score: u32, time_taken_ms: i64) -> Result<bool>;

    fn set_players_status(&self, room_code: &str, status: PlayerStatus) -> Result<usize>;

    /// Zero every player's score, clear their time and mark them `joined`.
    fn reset_players(&self, room_code: &str) -> Result<usize>;

    // -- users --

    /// Insert or update the user for `device_id`, returning the stored row.
    fn upsert_user(&self, device_id: &str, username: &str, updated_at: DateTime<Utc>) -> Result<User>;

    // -- change feed --

    /// Subscribe to insert/update/delete notifications on the players of one
    /// room.
    fn subscribe_players(&self, room_code: &str) -> Subscription;
}
