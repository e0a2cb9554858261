// Room lifecycle: create, join, leave, start, submit result, rematch.
//
// Starts and rematches are guarded by conditional updates in the store: the
// first writer wins, later writers observe the state it left behind.

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::question::{Question, QuestionShapeError};
use crate::room::{Navigation, Player, PlayerStatus, Room, RoomStatus};
use crate::store::TableStore;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ROOM_CODE_LEN: usize = 6;

/// Join-code alphabet. Omits 0/O and 1/I so codes survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const MAX_CODE_ATTEMPTS: usize = 8;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name must not be empty")]
    Empty,

    #[error("name must be at most {MAX_NAME_LEN} characters, got {len}")]
    TooLong { len: usize },
}

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("room {code} not found")]
    RoomNotFound { code: String },

    #[error("room {code} is not accepting players (status: {status})")]
    RoomNotJoinable { code: String, status: RoomStatus },

    #[error("player {id} not found")]
    PlayerNotFound { id: String },

    #[error("a match needs at least one question")]
    NoQuestions,

    #[error(transparent)]
    InvalidQuestion(#[from] QuestionShapeError),

    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trim a display name and enforce the length limit.
pub fn normalize_name(raw: &str) -> Result<String, NameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    let len = trimmed.chars().count();
    if len > MAX_NAME_LEN {
        return Err(NameError::TooLong { len });
    }
    Ok(trimmed.to_string())
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn load_room(store: &dyn TableStore, code: &str) -> Result<Room, LobbyError> {
    store.get_room(code)?.ok_or_else(|| LobbyError::RoomNotFound {
        code: code.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Create a waiting room with a fresh join code and seat the host in it.
pub fn create_room<R: Rng + ?Sized>(
    store: &dyn TableStore,
    host_name: &str,
    rng: &mut R,
) -> Result<(Room, Player), LobbyError> {
    let host_name = normalize_name(host_name)?;

    let mut room = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_room_code(rng);
        if store.get_room(&code)?.is_none() {
            let candidate = Room::waiting(code);
            store.insert_room(&candidate)?;
            room = Some(candidate);
            break;
        }
        debug!(%code, "room code collision, retrying");
    }
    let room = room.ok_or_else(|| {
        anyhow::anyhow!("could not allocate a free room code after {MAX_CODE_ATTEMPTS} attempts")
    })?;

    let host = Player::joined(Uuid::new_v4().to_string(), &room.code, host_name);
    store.insert_player(&host)?;

    info!(room = %room.code, host = %host.name, "room created");
    Ok((room, host))
}

/// Add a player to a room that is still waiting for its match to start.
pub fn join_room(store: &dyn TableStore, code: &str, name: &str) -> Result<Player, LobbyError> {
    let name = normalize_name(name)?;
    let room = load_room(store, code)?;
    if room.status != RoomStatus::Waiting {
        return Err(LobbyError::RoomNotJoinable {
            code: room.code,
            status: room.status,
        });
    }

    let player = Player::joined(Uuid::new_v4().to_string(), &room.code, name);
    store.insert_player(&player)?;
    info!(room = %room.code, player = %player.name, "player joined");
    Ok(player)
}

pub fn leave_room(store: &dyn TableStore, player_id: &str) -> Result<(), LobbyError> {
    if store.delete_player(player_id)? {
        info!(player = player_id, "player left");
        Ok(())
    } else {
        Err(LobbyError::PlayerNotFound {
            id: player_id.to_string(),
        })
    }
}

/// Start the match: store the question set and the shared start epoch, and
/// mark every player as playing.
///
/// If another client already started this room, nothing is overwritten and
/// the room as that client left it is returned, so both clients count down
/// against the same epoch.
pub fn start_match(
    store: &dyn TableStore,
    code: &str,
    questions: Vec<Question>,
    now_ms: i64,
) -> Result<Room, LobbyError> {
    if questions.is_empty() {
        return Err(LobbyError::NoQuestions);
    }
    for question in &questions {
        question.check_shape()?;
    }
    load_room(store, code)?;

    if store.start_room(code, &questions, now_ms)? {
        store.set_players_status(code, PlayerStatus::Playing)?;
        info!(room = code, questions = questions.len(), start = now_ms, "match started");
    } else {
        debug!(room = code, "match already started by another client");
    }
    load_room(store, code)
}

/// A player's own client writes its final score and time.
pub fn submit_result(
    store: &dyn TableStore,
    player_id: &str,
    score: u32,
    time_taken_ms: i64,
) -> Result<(), LobbyError> {
    if store.record_result(player_id, score, time_taken_ms)? {
        info!(player = player_id, score, time_taken_ms, "result recorded");
        Ok(())
    } else {
        Err(LobbyError::PlayerNotFound {
            id: player_id.to_string(),
        })
    }
}

/// Reset every player and the room for another match, then send the client
/// back to the lobby. A rematch of a room that is already waiting is a no-op.
pub fn rematch(store: &dyn TableStore, code: &str) -> Result<Navigation, LobbyError> {
    load_room(store, code)?;

    if store.reset_room(code)? {
        let players = store.reset_players(code)?;
        info!(room = code, players, "rematch: room reset");
    } else {
        debug!(room = code, "rematch: room already waiting");
    }

    Ok(Navigation::Lobby {
        room_code: code.to_string(),
    })
}

/// Mark an active room as ended once its shared deadline has passed.
pub fn close_if_expired(store: &dyn TableStore, code: &str, now_ms: i64) -> Result<bool, LobbyError> {
    let room = load_room(store, code)?;
    match (room.status, room.deadline_ms()) {
        (RoomStatus::Active, Some(deadline)) if now_ms >= deadline => {
            let ended = store.end_room(code)?;
            if ended {
                info!(room = code, "round over, room ended");
            }
            Ok(ended)
        }
        _ => Ok(false),
    }
}
