// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown
)]

//! End-to-end presence tests against a live relay.
//!
//! Every test starts an in-process relay on an OS-assigned port and drives
//! it with real WebSocket clients, the same way the browser game does:
//! connect to `/party/<system>`, read `sync`, `identify`, stream `move`s,
//! and close.
//!
//! These tests validate:
//! - A newcomer's `sync` lists exactly the identified players already there
//! - `join`, `move` and `leave` reach every other client exactly once
//! - The sender never hears its own events
//! - Garbage from one client never disturbs the others
//! - `/api/rooms` reflects live room membership

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use galaxy_proto::codec;
use galaxy_proto::message::{ClientMessage, ServerMessage};
use galaxy_proto::presence::{ConnectionId, Participant, Position};
use galaxy_relay::relay;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::tungstenite;

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// =============================================================================
// Client helpers
// =============================================================================

/// A connected game client that has consumed its initial `sync`.
struct Player {
    ws: Ws,
    roster: Vec<Participant>,
}

impl Player {
    async fn connect(addr: SocketAddr, system_id: &str) -> Self {
        let url = format!("ws://{addr}/party/{system_id}");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("websocket connect failed");
        let mut player = Self { ws, roster: vec![] };
        match player.recv().await {
            ServerMessage::Sync { players } => player.roster = players,
            other => panic!("expected Sync, got {other:?}"),
        }
        player
    }

    async fn send(&mut self, msg: &ClientMessage) {
        let text = codec::encode_client(msg).unwrap();
        self.ws
            .send(tungstenite::Message::Text(text.into()))
            .await
            .unwrap();
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(tungstenite::Message::Text(text.into()))
            .await
            .unwrap();
    }

    async fn identify(&mut self, name: &str) {
        self.send(&ClientMessage::Identify {
            username: name.to_string(),
        })
        .await;
    }

    async fn move_to(&mut self, x: f64, y: f64, z: f64) {
        self.send(&ClientMessage::Move {
            position: Position::new(x, y, z),
        })
        .await;
    }

    async fn recv(&mut self) -> ServerMessage {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        codec::decode_server(frame.to_text().unwrap()).unwrap()
    }

    /// Waits for a `join` and returns the announced id.
    async fn expect_join(&mut self, name: &str) -> ConnectionId {
        match self.recv().await {
            ServerMessage::Join { id, player } => {
                assert_eq!(player.username, name);
                assert_eq!(player.id, id);
                id
            }
            other => panic!("expected Join for {name}, got {other:?}"),
        }
    }

    async fn expect_silence(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(150), self.ws.next()).await;
        assert!(result.is_err(), "unexpected frame: {result:?}");
    }

    async fn close(mut self) {
        self.ws.close(None).await.unwrap();
    }
}

/// Fetches `GET /api/rooms` over a bare HTTP/1.1 connection.
async fn list_rooms(addr: SocketAddr) -> serde_json::Value {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/rooms HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .expect("no HTTP body");
    serde_json::from_str(body).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn newcomer_sync_depends_on_identification() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();

    let mut alice = Player::connect(addr, "sol").await;
    let mut bob = Player::connect(addr, "sol").await;
    // Alice has not identified yet, so Bob's roster is empty.
    assert!(bob.roster.is_empty());

    bob.identify("bob").await;
    let bob_id = alice.expect_join("bob").await;
    bob.expect_silence().await;

    alice.identify("alice").await;
    let alice_id = bob.expect_join("alice").await;

    let carol = Player::connect(addr, "sol").await;
    let mut ids: Vec<_> = carol.roster.iter().map(|p| p.id).collect();
    ids.sort();
    let mut expected = vec![alice_id, bob_id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn move_fans_out_to_every_other_player() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();

    let mut alice = Player::connect(addr, "sol").await;
    let mut bob = Player::connect(addr, "sol").await;
    let mut carol = Player::connect(addr, "sol").await;

    alice.identify("alice").await;
    let alice_id = bob.expect_join("alice").await;
    carol.expect_join("alice").await;

    alice.move_to(1.0, 2.0, 3.0).await;

    let expected = ServerMessage::Move {
        id: alice_id,
        position: Position::new(1.0, 2.0, 3.0),
    };
    assert_eq!(bob.recv().await, expected);
    assert_eq!(carol.recv().await, expected);
    bob.expect_silence().await;
    carol.expect_silence().await;
    alice.expect_silence().await;

    // A newcomer sees the last known position.
    let dave = Player::connect(addr, "sol").await;
    assert_eq!(dave.roster.len(), 1);
    assert_eq!(dave.roster[0].position, Some(Position::new(1.0, 2.0, 3.0)));
}

#[tokio::test]
async fn move_before_identify_is_not_relayed() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();

    let mut alice = Player::connect(addr, "sol").await;
    let mut bob = Player::connect(addr, "sol").await;

    alice.move_to(5.0, 5.0, 5.0).await;
    bob.expect_silence().await;
    alice.expect_silence().await;
}

#[tokio::test]
async fn leave_reaches_remaining_players_once() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();

    let mut alice = Player::connect(addr, "sol").await;
    let mut bob = Player::connect(addr, "sol").await;
    let mut carol = Player::connect(addr, "sol").await;

    alice.identify("alice").await;
    let alice_id = bob.expect_join("alice").await;
    carol.expect_join("alice").await;

    alice.close().await;

    assert_eq!(bob.recv().await, ServerMessage::Leave { id: alice_id });
    assert_eq!(carol.recv().await, ServerMessage::Leave { id: alice_id });
    bob.expect_silence().await;
    carol.expect_silence().await;

    let dave = Player::connect(addr, "sol").await;
    assert!(dave.roster.iter().all(|p| p.id != alice_id));
}

#[tokio::test]
async fn garbage_does_not_disturb_other_players() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();

    let mut alice = Player::connect(addr, "sol").await;
    let mut bob = Player::connect(addr, "sol").await;
    bob.identify("bob").await;
    alice.expect_join("bob").await;

    for junk in ["", "null", r#""hello""#, r#"{"username":"x"}"#, r#"{"type":"move"}"#] {
        alice.send_raw(junk).await;
        assert!(
            matches!(alice.recv().await, ServerMessage::Error { .. }),
            "no error reply for {junk:?}"
        );
    }
    // Unknown types are ignored silently.
    alice.send_raw(r#"{"type":"trade","credits":10}"#).await;

    bob.expect_silence().await;
    alice.expect_silence().await;

    // Both are still connected and functional.
    bob.move_to(0.0, 1.0, 0.0).await;
    assert!(matches!(alice.recv().await, ServerMessage::Move { .. }));
}

#[tokio::test]
async fn solar_systems_do_not_share_players() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();

    let mut sol_a = Player::connect(addr, "sol").await;
    let mut sol_b = Player::connect(addr, "sol").await;
    let mut vega = Player::connect(addr, "vega").await;

    vega.identify("vic").await;
    vega.move_to(9.0, 9.0, 9.0).await;

    sol_a.identify("alice").await;
    sol_b.expect_join("alice").await;

    sol_a.expect_silence().await;
    vega.expect_silence().await;
}

#[tokio::test]
async fn rooms_endpoint_tracks_membership() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();

    let body = list_rooms(addr).await;
    assert_eq!(body["rooms"], serde_json::json!([]));

    let mut alice = Player::connect(addr, "sol").await;
    let mut bob = Player::connect(addr, "sol").await;
    alice.identify("alice").await;
    bob.expect_join("alice").await;

    let body = list_rooms(addr).await;
    assert_eq!(
        body["rooms"],
        serde_json::json!([{ "system_id": "sol", "connections": 2, "players": 1 }])
    );

    alice.close().await;
    bob.recv().await;
    bob.close().await;

    // The empty room retires shortly after the last close.
    for _ in 0..100 {
        if list_rooms(addr).await["rooms"] == serde_json::json!([]) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room was never retired");
}
