// Match standings and the live leaderboard watcher.
//
// The watcher reloads the full standings after mount and after every trigger.
// A trigger is either a change notification for the room or a polling tick;
// the two are interchangeable from the caller's point of view.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use crate::realtime::Subscription;
use crate::room::{Player, PlayerStatus};
use crate::store::TableStore;

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based position.
    pub rank: usize,
    pub player_id: String,
    pub name: String,
    pub score: u32,
    pub time_taken: Option<i64>,
    pub status: PlayerStatus,
}

/// Leaderboard order: higher score first, then faster finish, with players
/// that have no finish time after those that do.
pub fn compare_standings(a: &Player, b: &Player) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| match (a.time_taken, b.time_taken) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Sort players into standings. Ties keep their input order.
pub fn rank(mut players: Vec<Player>) -> Vec<Standing> {
    players.sort_by(compare_standings);
    players
        .into_iter()
        .enumerate()
        .map(|(i, p)| Standing {
            rank: i + 1,
            player_id: p.id,
            name: p.name,
            score: p.score,
            time_taken: p.time_taken,
            status: p.status,
        })
        .collect()
}

pub fn load(store: &dyn TableStore, room_code: &str) -> anyhow::Result<Vec<Standing>> {
    Ok(rank(store.list_players(room_code)?))
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// What makes the watcher reload.
#[derive(Debug)]
pub enum RefreshTrigger {
    /// Reload on every change notification for the room.
    Changes(Subscription),
    /// Reload on a fixed period, for when no change feed is available.
    Polling(Duration),
}

/// Send the room's standings to `tx` now and again after every trigger.
///
/// Returns when the receiver is dropped or the change feed closes. Store
/// errors end the watch and are returned to the caller.
pub async fn watch(
    store: Arc<dyn TableStore>,
    room_code: String,
    trigger: RefreshTrigger,
    tx: mpsc::Sender<Vec<Standing>>,
) -> anyhow::Result<()> {
    let mut source = match trigger {
        RefreshTrigger::Changes(sub) => Source::Changes(sub),
        RefreshTrigger::Polling(period) => {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick is immediate; the initial load covers it.
            interval.tick().await;
            Source::Poll(interval)
        }
    };

    loop {
        let standings = load(store.as_ref(), &room_code)?;
        if tx.send(standings).await.is_err() {
            return Ok(());
        }

        match &mut source {
            Source::Changes(sub) => {
                tokio::select! {
                    _ = tx.closed() => return Ok(()),
                    change = sub.next() => match change {
                        Some(change) => debug!(room = %room_code, ?change, "players changed, reloading"),
                        None => return Ok(()),
                    },
                }
            }
            Source::Poll(interval) => {
                tokio::select! {
                    _ = tx.closed() => return Ok(()),
                    _ = interval.tick() => {}
                }
            }
        }
    }
}

enum Source {
    Changes(Subscription),
    Poll(Interval),
}
