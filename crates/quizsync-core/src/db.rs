// SQLite persistence layer for rooms, players and users.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::question::Question;
use crate::realtime::{ChangeHub, ChangeKind, PlayerChange, Subscription};
use crate::room::{Player, PlayerStatus, Room, RoomStatus, User};
use crate::store::TableStore;

/// SQLite-backed table store. Every player mutation is published on the
/// embedded [`ChangeHub`] after the write commits.
pub struct Database {
    conn: Mutex<Connection>,
    changes: ChangeHub,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rooms (
                code            TEXT PRIMARY KEY,
                status          TEXT NOT NULL DEFAULT 'waiting',
                questions       TEXT,
                game_start_time INTEGER,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS players (
                id         TEXT PRIMARY KEY,
                room_code  TEXT NOT NULL REFERENCES rooms(code),
                name       TEXT NOT NULL,
                score      INTEGER NOT NULL DEFAULT 0,
                time_taken INTEGER,
                status     TEXT NOT NULL DEFAULT 'joined',
                joined_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS users (
                id         TEXT PRIMARY KEY,
                device_id  TEXT NOT NULL UNIQUE,
                username   TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_players_room_code ON players(room_code);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            changes: ChangeHub::new(),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn publish(&self, room_code: &str, player_id: Option<&str>, kind: ChangeKind) {
        self.changes.publish(PlayerChange {
            room_code: room_code.to_string(),
            player_id: player_id.map(str::to_string),
            kind,
        });
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

type RoomRow = (String, String, Option<String>, Option<i64>);
type PlayerRow = (String, String, String, u32, Option<i64>, String);

fn room_from_row((code, status, questions, game_start_time): RoomRow) -> Result<Room> {
    let status: RoomStatus = status
        .parse()
        .with_context(|| format!("room {code} has a corrupt status"))?;
    let questions = questions
        .map(|json| serde_json::from_str::<Vec<Question>>(&json))
        .transpose()
        .with_context(|| format!("room {code} has corrupt questions"))?;
    Ok(Room {
        code,
        status,
        questions,
        game_start_time,
    })
}

fn player_from_row((id, room_code, name, score, time_taken, status): PlayerRow) -> Result<Player> {
    let status: PlayerStatus = status
        .parse()
        .with_context(|| format!("player {id} has a corrupt status"))?;
    Ok(Player {
        id,
        room_code,
        name,
        score,
        time_taken,
        status,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp `{raw}`"))
}

// ---------------------------------------------------------------------------
// TableStore
// ---------------------------------------------------------------------------

impl TableStore for Database {
    fn insert_room(&self, room: &Room) -> Result<()> {
        let questions_json = room
            .questions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize room questions")?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO rooms (code, status, questions, game_start_time) VALUES (?1, ?2, ?3, ?4)",
            params![room.code, room.status.as_str(), questions_json, room.game_start_time],
        )
        .with_context(|| format!("failed to insert room {}", room.code))?;
        Ok(())
    }

    fn get_room(&self, code: &str) -> Result<Option<Room>> {
        let row: Option<RoomRow> = {
            let conn = self.conn();
            conn.query_row(
                "SELECT code, status, questions, game_start_time FROM rooms WHERE code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .with_context(|| format!("failed to load room {code}"))?
        };
        row.map(room_from_row).transpose()
    }

    fn start_room(&self, code: &str, questions: &[Question], start_ms: i64) -> Result<bool> {
        let questions_json =
            serde_json::to_string(questions).context("failed to serialize room questions")?;
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE rooms SET questions = ?2, game_start_time = ?3, status = 'active'
                 WHERE code = ?1 AND status = 'waiting'",
                params![code, questions_json, start_ms],
            )
            .with_context(|| format!("failed to start room {code}"))?;
        Ok(changed > 0)
    }

    fn reset_room(&self, code: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE rooms SET status = 'waiting', questions = NULL, game_start_time = NULL
                 WHERE code = ?1 AND status != 'waiting'",
                params![code],
            )
            .with_context(|| format!("failed to reset room {code}"))?;
        Ok(changed > 0)
    }

    fn end_room(&self, code: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE rooms SET status = 'ended' WHERE code = ?1 AND status = 'active'",
                params![code],
            )
            .with_context(|| format!("failed to end room {code}"))?;
        Ok(changed > 0)
    }

    fn insert_player(&self, player: &Player) -> Result<()> {
        {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO players (id, room_code, name, score, time_taken, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    player.id,
                    player.room_code,
                    player.name,
                    player.score,
                    player.time_taken,
                    player.status.as_str(),
                ],
            )
            .with_context(|| format!("failed to insert player {}", player.id))?;
        }
        self.publish(&player.room_code, Some(&player.id), ChangeKind::Insert);
        Ok(())
    }

    fn get_player(&self, id: &str) -> Result<Option<Player>> {
        let row: Option<PlayerRow> = {
            let conn = self.conn();
            conn.query_row(
                "SELECT id, room_code, name, score, time_taken, status FROM players WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("failed to load player {id}"))?
        };
        row.map(player_from_row).transpose()
    }

    fn delete_player(&self, id: &str) -> Result<bool> {
        let room_code: Option<String> = {
            let conn = self.conn();
            conn.query_row(
                "DELETE FROM players WHERE id = ?1 RETURNING room_code",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to delete player {id}"))?
        };
        match room_code {
            Some(room_code) => {
                self.publish(&room_code, Some(id), ChangeKind::Delete);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_players(&self, room_code: &str) -> Result<Vec<Player>> {
        let rows: Vec<PlayerRow> = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare(
                    "SELECT id, room_code, name, score, time_taken, status
                     FROM players WHERE room_code = ?1
                     ORDER BY score DESC, time_taken IS NULL, time_taken ASC, joined_at ASC",
                )
                .context("failed to prepare list_players query")?;
            let rows = stmt
                .query_map(params![room_code], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .context("failed to query players")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map player rows")?;
            rows
        };
        rows.into_iter().map(player_from_row).collect()
    }

    fn record_result(&self, player_id: &str, score: u32, time_taken_ms: i64) -> Result<bool> {
        let room_code: Option<String> = {
            let conn = self.conn();
            conn.query_row(
                "UPDATE players SET score = ?2, time_taken = ?3, status = 'finished'
                 WHERE id = ?1 RETURNING room_code",
                params![player_id, score, time_taken_ms],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to record result for player {player_id}"))?
        };
        match room_code {
            Some(room_code) => {
                self.publish(&room_code, Some(player_id), ChangeKind::Update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_players_status(&self, room_code: &str, status: PlayerStatus) -> Result<usize> {
        let changed = {
            let conn = self.conn();
            conn.execute(
                "UPDATE players SET status = ?2 WHERE room_code = ?1",
                params![room_code, status.as_str()],
            )
            .with_context(|| format!("failed to set player status in room {room_code}"))?
        };
        if changed > 0 {
            self.publish(room_code, None, ChangeKind::Update);
        }
        Ok(changed)
    }

    fn reset_players(&self, room_code: &str) -> Result<usize> {
        let changed = {
            let conn = self.conn();
            conn.execute(
                "UPDATE players SET score = 0, time_taken = NULL, status = 'joined'
                 WHERE room_code = ?1",
                params![room_code],
            )
            .with_context(|| format!("failed to reset players in room {room_code}"))?
        };
        if changed > 0 {
            self.publish(room_code, None, ChangeKind::Update);
        }
        Ok(changed)
    }

    fn upsert_user(&self, device_id: &str, username: &str, updated_at: DateTime<Utc>) -> Result<User> {
        let new_id = uuid::Uuid::new_v4().to_string();
        let (id, device_id, username, updated_at): (String, String, String, String) = {
            let conn = self.conn();
            conn.query_row(
                "INSERT INTO users (id, device_id, username, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(device_id) DO UPDATE SET
                    username   = excluded.username,
                    updated_at = excluded.updated_at
                 RETURNING id, device_id, username, updated_at",
                params![new_id, device_id, username, updated_at.to_rfc3339()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .with_context(|| format!("failed to upsert user for device {device_id}"))?
        };
        Ok(User {
            id,
            device_id,
            username,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn subscribe_players(&self, room_code: &str) -> Subscription {
        self.changes.subscribe(room_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::AnswerLetter;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn sample_questions() -> Vec<Question> {
        (1..=3)
            .map(|i| Question {
                id: format!("q{i}"),
                category: "Space".into(),
                difficulty: "easy".into(),
                question: format!("Space question {i}?"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: AnswerLetter::B,
                explanation: "because".into(),
            })
            .collect()
    }

    fn seed_room(db: &Database, code: &str) {
        db.insert_room(&Room::waiting(code)).unwrap();
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"rooms".to_string()));
        assert!(tables.contains(&"players".to_string()));
        assert!(tables.contains(&"users".to_string()));
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    #[test]
    fn insert_and_get_room() {
        let db = test_db();
        seed_room(&db, "ABC234");
        let room = db.get_room("ABC234").unwrap().unwrap();
        assert_eq!(room, Room::waiting("ABC234"));
        assert!(db.get_room("NOPE00").unwrap().is_none());
    }

    #[test]
    fn duplicate_room_code_is_rejected() {
        let db = test_db();
        seed_room(&db, "ABC234");
        assert!(db.insert_room(&Room::waiting("ABC234")).is_err());
    }

    #[test]
    fn start_room_sets_questions_and_epoch_once() {
        let db = test_db();
        seed_room(&db, "ABC234");
        let questions = sample_questions();

        assert!(db.start_room("ABC234", &questions, 1_000).unwrap());
        // Second starter loses; first start time stays.
        assert!(!db.start_room("ABC234", &questions[..1], 9_000).unwrap());

        let room = db.get_room("ABC234").unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Active);
        assert_eq!(room.game_start_time, Some(1_000));
        assert_eq!(room.questions.unwrap(), questions);
    }

    #[test]
    fn reset_room_clears_match_state_idempotently() {
        let db = test_db();
        seed_room(&db, "ABC234");
        db.start_room("ABC234", &sample_questions(), 1_000).unwrap();

        assert!(db.reset_room("ABC234").unwrap());
        assert!(!db.reset_room("ABC234").unwrap());
        assert_eq!(db.get_room("ABC234").unwrap().unwrap(), Room::waiting("ABC234"));
    }

    #[test]
    fn end_room_only_from_active() {
        let db = test_db();
        seed_room(&db, "ABC234");
        assert!(!db.end_room("ABC234").unwrap());
        db.start_room("ABC234", &sample_questions(), 1_000).unwrap();
        assert!(db.end_room("ABC234").unwrap());
        assert_eq!(
            db.get_room("ABC234").unwrap().unwrap().status,
            RoomStatus::Ended
        );
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    #[test]
    fn player_requires_existing_room() {
        let db = test_db();
        let err = db.insert_player(&Player::joined("p1", "GHOST1", "Ann"));
        assert!(err.is_err());
    }

    #[test]
    fn list_players_orders_by_score_then_time_nulls_last() {
        let db = test_db();
        seed_room(&db, "ABC234");
        for (id, name) in [("p1", "Ann"), ("p2", "Bat"), ("p3", "Cal"), ("p4", "Dee")] {
            db.insert_player(&Player::joined(id, "ABC234", name)).unwrap();
        }
        db.record_result("p1", 5, 30_000).unwrap();
        db.record_result("p2", 7, 40_000).unwrap();
        db.record_result("p3", 5, 20_000).unwrap();
        // p4 never finishes: score 0, no time.

        let names: Vec<String> = db
            .list_players("ABC234")
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Bat", "Cal", "Ann", "Dee"]);
    }

    #[test]
    fn record_result_marks_finished() {
        let db = test_db();
        seed_room(&db, "ABC234");
        db.insert_player(&Player::joined("p1", "ABC234", "Ann")).unwrap();

        assert!(db.record_result("p1", 8, 12_000).unwrap());
        assert!(!db.record_result("missing", 1, 1).unwrap());

        let p = db.get_player("p1").unwrap().unwrap();
        assert_eq!(p.score, 8);
        assert_eq!(p.time_taken, Some(12_000));
        assert_eq!(p.status, PlayerStatus::Finished);
    }

    #[test]
    fn reset_players_restores_defaults() {
        let db = test_db();
        seed_room(&db, "ABC234");
        db.insert_player(&Player::joined("p1", "ABC234", "Ann")).unwrap();
        db.record_result("p1", 8, 12_000).unwrap();

        assert_eq!(db.reset_players("ABC234").unwrap(), 1);
        assert_eq!(
            db.get_player("p1").unwrap().unwrap(),
            Player::joined("p1", "ABC234", "Ann")
        );
    }

    #[test]
    fn delete_player_reports_presence() {
        let db = test_db();
        seed_room(&db, "ABC234");
        db.insert_player(&Player::joined("p1", "ABC234", "Ann")).unwrap();
        assert!(db.delete_player("p1").unwrap());
        assert!(!db.delete_player("p1").unwrap());
        assert!(db.get_player("p1").unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Change feed
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn player_mutations_are_published() {
        let db = test_db();
        seed_room(&db, "ABC234");
        let mut sub = db.subscribe_players("ABC234");

        db.insert_player(&Player::joined("p1", "ABC234", "Ann")).unwrap();
        db.record_result("p1", 3, 9_000).unwrap();
        db.delete_player("p1").unwrap();

        let kinds = [
            sub.next().await.unwrap().kind,
            sub.next().await.unwrap().kind,
            sub.next().await.unwrap().kind,
        ];
        assert_eq!(kinds, [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);
    }

    #[tokio::test]
    async fn bulk_updates_publish_one_room_change() {
        let db = test_db();
        seed_room(&db, "ABC234");
        db.insert_player(&Player::joined("p1", "ABC234", "Ann")).unwrap();
        db.insert_player(&Player::joined("p2", "ABC234", "Bat")).unwrap();
        let mut sub = db.subscribe_players("ABC234");

        db.set_players_status("ABC234", PlayerStatus::Playing).unwrap();
        let change = sub.next().await.unwrap();
        assert_eq!(change.player_id, None);
        assert_eq!(change.kind, ChangeKind::Update);
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    #[test]
    fn upsert_user_keeps_id_per_device() {
        let db = test_db();
        let t0 = Utc::now();
        let first = db.upsert_user("device-1", "ann", t0).unwrap();
        let second = db.upsert_user("device-1", "annie", t0).unwrap();
        let other = db.upsert_user("device-2", "bat", t0).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.username, "annie");
        assert_ne!(first.id, other.id);
    }
}
