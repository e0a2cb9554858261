// Round countdown reconciled against the room's shared start epoch.
//
// Every client derives its remaining time from `game_start_time + 45s - now`
// and clamps it at zero. A purely local 45-second timer is only used when the
// room carries no shared start time (legacy rooms).

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Length of one round in seconds.
pub const ROUND_SECS: u32 = 45;

/// Length of one round in milliseconds.
pub const ROUND_DURATION_MS: i64 = ROUND_SECS as i64 * 1000;

/// Countdown display resolution.
pub const TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Remaining-time arithmetic
// ---------------------------------------------------------------------------

/// Whole seconds left until `deadline_ms`, rounded up and clamped at zero.
pub fn remaining_until(deadline_ms: i64, now_ms: i64) -> u32 {
    let remaining_ms = deadline_ms.saturating_sub(now_ms).max(0);
    let secs = remaining_ms.saturating_add(999) / 1000;
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// Whole seconds left in a round that started at `start_ms`.
pub fn remaining_secs(start_ms: i64, now_ms: i64) -> u32 {
    remaining_until(start_ms.saturating_add(ROUND_DURATION_MS), now_ms)
}

// ---------------------------------------------------------------------------
// Entry decision
// ---------------------------------------------------------------------------

/// Which clock the countdown is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSource {
    /// The room's stored `game_start_time`.
    Shared,
    /// No shared epoch was stored; a local 45-second round started on entry.
    LocalFallback,
}

/// What a client does when it enters a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDecision {
    /// The round is already over: go straight to the leaderboard without
    /// showing any question.
    Redirect,
    Play {
        deadline_ms: i64,
        remaining_secs: u32,
        source: TimerSource,
    },
}

impl EntryDecision {
    pub fn evaluate(game_start_time: Option<i64>, now_ms: i64) -> Self {
        match game_start_time {
            Some(start) => {
                let deadline_ms = start.saturating_add(ROUND_DURATION_MS);
                let remaining = remaining_until(deadline_ms, now_ms);
                debug!(start, now_ms, remaining, "evaluated shared round timer");
                if remaining == 0 {
                    EntryDecision::Redirect
                } else {
                    EntryDecision::Play {
                        deadline_ms,
                        remaining_secs: remaining,
                        source: TimerSource::Shared,
                    }
                }
            }
            None => {
                warn!("room has no game_start_time, falling back to a local round timer");
                EntryDecision::Play {
                    deadline_ms: now_ms.saturating_add(ROUND_DURATION_MS),
                    remaining_secs: ROUND_SECS,
                    source: TimerSource::LocalFallback,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Countdown task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// One second elapsed; `remaining` is still above zero.
    Tick { remaining: u32 },
    /// The round is over. Sent exactly once, after which the task exits.
    Expired,
}

/// Owns the running countdown task. Dropping the handle aborts the task, so
/// tearing down the owning view stops all further events.
#[derive(Debug)]
pub struct CountdownHandle {
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn cancel(self) {
        // Drop aborts.
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Countdown;

impl Countdown {
    /// Start a one-second interval counting down from `remaining` seconds.
    ///
    /// Emits [`CountdownEvent::Tick`] for every second that still leaves time
    /// on the clock and a single [`CountdownEvent::Expired`] when it reaches
    /// zero. Stops early if the receiver is dropped.
    pub fn spawn(remaining: u32, tx: mpsc::Sender<CountdownEvent>) -> CountdownHandle {
        let task = tokio::spawn(async move {
            let mut remaining = remaining;
            let mut interval = tokio::time::interval(TICK);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            while remaining > 0 {
                interval.tick().await;
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                if tx.send(CountdownEvent::Tick { remaining }).await.is_err() {
                    return;
                }
            }

            debug!("round countdown expired");
            let _ = tx.send(CountdownEvent::Expired).await;
        });

        CountdownHandle { task }
    }
}
