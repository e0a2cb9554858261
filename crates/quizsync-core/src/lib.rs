// Library root for the multiplayer quiz domain: rooms, players, the shared
// countdown, per-player question flow, leaderboard and the table store.

pub mod clock;
pub mod countdown;
pub mod db;
pub mod device;
pub mod leaderboard;
pub mod lobby;
pub mod question;
pub mod realtime;
pub mod room;
pub mod scoring;
pub mod session;
pub mod shuffle;
pub mod store;
