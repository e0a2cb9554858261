// One player's pass through a multiplayer round.
//
// The session shuffles the room's shared question set, records one answer per
// question with auto-advance, writes the final score and time to the player's
// own row, and then waits for the shared countdown to send everyone to the
// leaderboard. Finishing early never navigates; only expiry does.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::countdown::{remaining_until, Countdown, CountdownEvent, CountdownHandle, EntryDecision, TimerSource};
use crate::device::DeviceProfile;
use crate::question::{AnswerLetter, Question};
use crate::room::Navigation;
use crate::scoring::{elapsed_secs, tally_score, time_taken_ms};
use crate::shuffle::shuffled;
use crate::store::TableStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("room {code} not found")]
    RoomNotFound { code: String },

    #[error("room {code} has no questions")]
    NoQuestions { code: String },

    #[error("the round is no longer accepting answers")]
    NotPlaying,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Questions remain to be answered.
    Playing,
    /// All questions answered and the result written; the countdown is still
    /// running for the other players.
    WaitingForOthers,
    /// The shared countdown reached zero.
    Over,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub score: u32,
    pub time_taken_ms: i64,
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Moved on to the question at `index`.
    Advanced { index: usize },
    /// That was the last question.
    Finished(MatchResult),
}

pub enum Entered {
    /// The round was already over on entry.
    Redirect(Navigation),
    Playing(MatchSession),
}

impl std::fmt::Debug for Entered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entered::Redirect(nav) => f.debug_tuple("Redirect").field(nav).finish(),
            Entered::Playing(s) => f
                .debug_struct("Playing")
                .field("room_code", &s.room_code)
                .field("deadline_ms", &s.deadline_ms)
                .finish_non_exhaustive(),
        }
    }
}

pub struct MatchSession {
    store: Arc<dyn TableStore>,
    clock: Arc<dyn Clock>,
    room_code: String,
    player_id: Option<String>,
    questions: Vec<Question>,
    current: usize,
    answers: HashMap<String, AnswerLetter>,
    deadline_ms: i64,
    source: TimerSource,
    phase: Phase,
    result: Option<MatchResult>,
    navigated: bool,
}

impl MatchSession {
    /// Load the room and either join the running round or, if its shared
    /// deadline has already passed, redirect to the leaderboard without
    /// showing any question.
    pub fn enter<R: Rng + ?Sized>(
        store: Arc<dyn TableStore>,
        clock: Arc<dyn Clock>,
        room_code: &str,
        player_id: Option<String>,
        rng: &mut R,
    ) -> Result<Entered, SessionError> {
        let room = store
            .get_room(room_code)?
            .ok_or_else(|| SessionError::RoomNotFound {
                code: room_code.to_string(),
            })?;

        let (deadline_ms, source) = match EntryDecision::evaluate(room.game_start_time, clock.now_ms()) {
            EntryDecision::Redirect => {
                info!(room = room_code, "round already over, going to leaderboard");
                return Ok(Entered::Redirect(Navigation::Leaderboard {
                    room_code: room_code.to_string(),
                }));
            }
            EntryDecision::Play {
                deadline_ms,
                remaining_secs,
                source,
            } => {
                debug!(room = room_code, remaining_secs, ?source, "entering round");
                (deadline_ms, source)
            }
        };

        let questions = match room.questions {
            Some(qs) if !qs.is_empty() => shuffled(&qs, rng),
            _ => {
                return Err(SessionError::NoQuestions {
                    code: room_code.to_string(),
                })
            }
        };

        Ok(Entered::Playing(MatchSession {
            store,
            clock,
            room_code: room_code.to_string(),
            player_id,
            questions,
            current: 0,
            answers: HashMap::new(),
            deadline_ms,
            source,
            phase: Phase::Playing,
            result: None,
            navigated: false,
        }))
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timer_source(&self) -> TimerSource {
        self.source
    }

    pub fn deadline_ms(&self) -> i64 {
        self.deadline_ms
    }

    /// This player's question order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    /// The question on screen, or `None` once every question is answered.
    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            Phase::Playing => self.questions.get(self.current),
            _ => None,
        }
    }

    /// `(index, total)` of the current question.
    pub fn progress(&self) -> (usize, usize) {
        (self.current, self.questions.len())
    }

    /// Seconds left on the shared countdown, clamped at zero.
    pub fn remaining_secs(&self) -> u32 {
        remaining_until(self.deadline_ms, self.clock.now_ms())
    }

    /// Record `letter` for the current question and move on. Answering the
    /// last question finalizes the round for this player.
    pub fn answer(&mut self, letter: AnswerLetter) -> Result<AnswerOutcome, SessionError> {
        let id = self.current_question().ok_or(SessionError::NotPlaying)?.id.clone();
        self.answers.insert(id, letter);
        self.current += 1;

        if self.current < self.questions.len() {
            return Ok(AnswerOutcome::Advanced { index: self.current });
        }
        match self.finish() {
            Ok(result) => Ok(AnswerOutcome::Finished(result)),
            Err(e) => {
                // Stay on the last question so answering it again retries the write.
                self.current -= 1;
                Err(e)
            }
        }
    }

    /// Like [`MatchSession::answer`], and once the round is finished also
    /// drops this room's snapshot from the device profile.
    pub fn answer_on_device(
        &mut self,
        letter: AnswerLetter,
        profile: &mut DeviceProfile,
    ) -> Result<AnswerOutcome, SessionError> {
        let outcome = self.answer(letter)?;
        if matches!(outcome, AnswerOutcome::Finished(_)) {
            if let Err(e) = profile.clear_snapshot(&self.room_code) {
                warn!(room = %self.room_code, "failed to clear game snapshot: {e}");
            }
        }
        Ok(outcome)
    }

    fn finish(&mut self) -> Result<MatchResult, SessionError> {
        let score = tally_score(&self.questions, &self.answers);
        let elapsed = elapsed_secs(self.remaining_secs());
        let result = MatchResult {
            score,
            time_taken_ms: time_taken_ms(elapsed),
            answered: self.answers.len(),
            total: self.questions.len(),
        };
        match &self.player_id {
            Some(player_id) => {
                if self.store.record_result(player_id, score, result.time_taken_ms)? {
                    info!(room = %self.room_code, player = %player_id, score, elapsed, "finished round");
                } else {
                    warn!(room = %self.room_code, player = %player_id, "player row missing, result not stored");
                }
            }
            None => debug!(room = %self.room_code, "no player id, skipping result write"),
        }
        self.result = Some(result);
        self.phase = Phase::WaitingForOthers;
        Ok(result)
    }

    /// The shared countdown hit zero. Returns the leaderboard route the first
    /// time only.
    pub fn expire(&mut self) -> Option<Navigation> {
        self.phase = Phase::Over;
        if self.navigated {
            return None;
        }
        self.navigated = true;
        Some(Navigation::Leaderboard {
            room_code: self.room_code.clone(),
        })
    }

    /// Start the display countdown from the current remaining time.
    pub fn start_countdown(&self, tx: mpsc::Sender<CountdownEvent>) -> CountdownHandle {
        Countdown::spawn(self.remaining_secs(), tx)
    }
}
