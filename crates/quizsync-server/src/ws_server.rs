// WebSocket feed pushing live leaderboard standings to subscribed clients.
//
// Each connection gets its own task. A `subscribe` message starts a
// leaderboard watcher for that room whose reloads are written back to the
// socket; the watcher stops when the connection ends or re-subscribes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use quizsync_core::leaderboard::{self, RefreshTrigger};
use quizsync_core::store::TableStore;

use crate::protocol::{ClientMessage, ServerMessage};

/// Outgoing messages buffered per connection.
const OUTBOX_CAPACITY: usize = 32;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept WebSocket clients on `listener` forever, one task per connection.
pub async fn serve(listener: TcpListener, store: Arc<dyn TableStore>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("realtime feed listening on ws://{local_addr}");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr.to_string(), store.clone()));
            }
            Err(e) => {
                // e.g. EMFILE; the listener itself is still usable.
                warn!("failed to accept realtime client: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: String, store: Arc<dyn TableStore>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };
    info!("realtime client connected: {addr}");

    let (mut write, read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);

    let writer_addr = addr.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to encode message for {writer_addr}: {e}");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(text.into())).await {
                debug!("write to {writer_addr} failed: {e}");
                break;
            }
        }
    });

    process_message_stream(read, &store, &out_tx, &addr).await;
    drop(out_tx);
    writer.abort();
    info!("realtime client disconnected: {addr}");
}

/// Aborts the watcher task when dropped.
struct WatchGuard(JoinHandle<()>);

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Handle client messages until the stream ends, a close frame arrives, or
/// the socket errors. Subscriptions started here stop when it returns.
pub async fn process_message_stream<St>(
    mut stream: St,
    store: &Arc<dyn TableStore>,
    out: &mpsc::Sender<ServerMessage>,
    addr: &str,
) where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut watcher: Option<WatchGuard> = None;

    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Subscribe { room_code }) => {
                    info!("client {addr} subscribed to room {room_code}");
                    watcher = Some(spawn_watcher(store.clone(), room_code, out.clone()));
                }
                Ok(ClientMessage::Unsubscribe) => {
                    debug!("client {addr} unsubscribed");
                    watcher = None;
                }
                Err(e) => {
                    warn!("bad message from {addr}: {e}");
                    let reply = ServerMessage::Error {
                        message: format!("unrecognized message: {e}"),
                    };
                    if out.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }

    drop(watcher);
}

fn spawn_watcher(store: Arc<dyn TableStore>, room_code: String, out: mpsc::Sender<ServerMessage>) -> WatchGuard {
    WatchGuard(tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel(8);
        let trigger = RefreshTrigger::Changes(store.subscribe_players(&room_code));
        let watch = leaderboard::watch(store, room_code.clone(), trigger, tx);

        // Owns the receiver so that a closed socket also ends the watcher.
        let forward = {
            let room_code = room_code.clone();
            let out = out.clone();
            async move {
                while let Some(standings) = rx.recv().await {
                    let msg = ServerMessage::Standings {
                        room_code: room_code.clone(),
                        standings,
                    };
                    if out.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        };

        let (result, ()) = tokio::join!(watch, forward);
        if let Err(e) = result {
            warn!(room = %room_code, "leaderboard watch failed: {e:#}");
            let _ = out
                .send(ServerMessage::Error {
                    message: format!("leaderboard unavailable: {e}"),
                })
                .await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use quizsync_core::db::Database;
    use quizsync_core::room::{Player, Room};
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn seeded_store() -> (Arc<Database>, Arc<dyn TableStore>) {
        let db = Arc::new(Database::open(":memory:").unwrap());
        db.insert_room(&Room::waiting("ROOM01")).unwrap();
        db.insert_player(&Player::joined("p1", "ROOM01", "Ann")).unwrap();
        db.insert_player(&Player::joined("p2", "ROOM01", "Bat")).unwrap();
        let store: Arc<dyn TableStore> = db.clone();
        (db, store)
    }

    fn text(s: &str) -> Result<Message, WsError> {
        Ok(Message::Text(s.to_string().into()))
    }

    #[tokio::test]
    async fn subscribe_pushes_standings_and_updates() {
        let (db, store) = seeded_store();
        let (out_tx, mut out_rx) = mpsc::channel(16);

        // Keep the stream open after the subscribe so the watcher stays alive.
        let messages = stream::iter(vec![text(r#"{"type":"subscribe","room_code":"ROOM01"}"#)])
            .chain(stream::pending());
        let conn = tokio::spawn(async move {
            process_message_stream(messages, &store, &out_tx, "test").await;
        });

        match out_rx.recv().await.unwrap() {
            ServerMessage::Standings { room_code, standings } => {
                assert_eq!(room_code, "ROOM01");
                assert_eq!(standings.len(), 2);
            }
            other => panic!("expected standings, got {other:?}"),
        }

        db.record_result("p2", 9, 12_000).unwrap();
        match out_rx.recv().await.unwrap() {
            ServerMessage::Standings { standings, .. } => {
                assert_eq!(standings[0].player_id, "p2");
                assert_eq!(standings[0].score, 9);
            }
            other => panic!("expected standings, got {other:?}"),
        }

        // Tearing down the connection stops the watcher and closes the feed.
        conn.abort();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn feed_keeps_serving_after_a_failed_client() {
        use tokio::io::AsyncWriteExt;

        let (_db, store) = seeded_store();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, store));

        // Not a WebSocket handshake.
        let mut junk = TcpStream::connect(addr).await.unwrap();
        junk.write_all(b"hello\r\n\r\n").await.unwrap();
        drop(junk);

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(Message::Text(r#"{"type":"subscribe","room_code":"ROOM01"}"#.into()))
            .await
            .unwrap();
        let reply = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break text,
                _ => continue,
            }
        };
        let reply: serde_json::Value = serde_json::from_str(reply.as_str()).unwrap();
        assert_eq!(reply["type"], "standings");
        assert_eq!(reply["standings"].as_array().unwrap().len(), 2);

        assert!(!server.is_finished());
        server.abort();
    }

    #[tokio::test]
    async fn bad_message_gets_an_error_reply() {
        let (_db, store) = seeded_store();
        let (out_tx, mut out_rx) = mpsc::channel(16);

        process_message_stream(stream::iter(vec![text("not json")]), &store, &out_tx, "test").await;

        assert!(matches!(out_rx.recv().await, Some(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let (_db, store) = seeded_store();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let messages = vec![
            Ok(Message::Close(None)),
            text("after close should not be read"),
        ];

        process_message_stream(stream::iter(messages), &store, &out_tx, "test").await;
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_and_ignored_frames() {
        let (_db, store) = seeded_store();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Err(WsError::ConnectionClosed),
            text("after error should not be read"),
        ];

        process_message_stream(stream::iter(messages), &store, &out_tx, "test").await;
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_updates() {
        let (db, store) = seeded_store();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel::<Result<Message, WsError>>();

        let messages = stream::unfold(msg_rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) });
        let messages = Box::pin(messages);
        let conn = tokio::spawn(async move {
            process_message_stream(messages, &store, &out_tx, "test").await;
        });

        msg_tx.send(text(r#"{"type":"subscribe","room_code":"ROOM01"}"#)).unwrap();
        assert!(matches!(out_rx.recv().await, Some(ServerMessage::Standings { .. })));

        msg_tx.send(text(r#"{"type":"unsubscribe"}"#)).unwrap();
        // Let the connection task handle the unsubscribe before writing.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        db.record_result("p1", 1, 1_000).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(out_rx.try_recv().is_err());

        drop(msg_tx);
        conn.await.unwrap();
    }
}
