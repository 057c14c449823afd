// End-to-end check of the WebSocket surface: two raw tokio-tungstenite
// clients against a server bound to a free localhost port.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gameroom_protocol::{
    CreateRoomData, Envelope, ErrorData, JoinRoomData, MessageType, RoomListData, StartGameData,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> SocketAddr {
    let (addr, _handle) = gameroom_server::start("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    addr
}

async fn send(ws: &mut Ws, envelope: &Envelope) {
    ws.send(Message::Text(envelope.encode().unwrap())).await.unwrap();
}

async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

/// Next envelope off the socket, skipping control frames.
async fn recv(ws: &mut Ws) -> Envelope {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for server")
            .expect("stream ended")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return Envelope::decode(&text).unwrap();
        }
    }
}

/// Reads until an envelope of `kind` shows up.
async fn recv_kind(ws: &mut Ws, kind: MessageType) -> Envelope {
    loop {
        let env = recv(ws).await;
        if env.kind == kind {
            return env;
        }
    }
}

/// Connects and consumes the greeting; returns the assigned id.
async fn connect(addr: SocketAddr) -> (Ws, String) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let hello = recv(&mut ws).await;
    assert_eq!(hello.kind, MessageType::Connected);
    let id = hello.player_id.unwrap();
    let list = recv(&mut ws).await;
    assert_eq!(list.kind, MessageType::RoomList);
    (ws, id)
}

#[tokio::test]
async fn banner_on_root_path() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut body = String::new();
    timeout(WAIT, stream.read_to_string(&mut body)).await.unwrap().unwrap();
    assert!(body.starts_with("HTTP/1.1 200"));
    assert!(body.contains("Game server is running"));
}

#[tokio::test]
async fn full_session_over_websocket() {
    let addr = start_server().await;
    let (mut a, a_id) = connect(addr).await;
    let (mut b, b_id) = connect(addr).await;
    assert_ne!(a_id, b_id);

    let create = Envelope::new(MessageType::CreateRoom)
        .with_data(&CreateRoomData { game_type: "connect_four".into(), room_name: "Den".into() })
        .unwrap();
    send(&mut a, &create).await;
    let created = recv_kind(&mut a, MessageType::RoomCreated).await;
    let room_id = created.room_id.unwrap();

    let list: RoomListData = recv_kind(&mut b, MessageType::RoomList).await.decode_data().unwrap();
    assert_eq!(list.rooms.len(), 1);
    assert_eq!(list.rooms[0].id, room_id);
    assert_eq!(list.rooms[0].max_players, 2);

    let join = Envelope::new(MessageType::JoinRoom)
        .with_data(&JoinRoomData { room_id: room_id.clone() })
        .unwrap();
    send(&mut b, &join).await;
    let joined = recv_kind(&mut a, MessageType::PlayerJoined).await;
    assert_eq!(joined.player_id.as_deref(), Some(b_id.as_str()));

    send(&mut b, &Envelope::new(MessageType::StartGame)).await;
    let start_a: StartGameData = recv_kind(&mut a, MessageType::StartGame).await.decode_data().unwrap();
    let start_b: StartGameData = recv_kind(&mut b, MessageType::StartGame).await.decode_data().unwrap();
    assert_eq!((start_a.player_number, start_b.player_number), (0, 1));
    assert_eq!(start_a.total_players, 2);

    let payload = |column: u32| format!(r#"{{"z":{column}, "a":0,"big":123456789012345678901234567890}}"#);
    for column in 0..10 {
        send_raw(&mut b, &format!(r#"{{"type":"game_move","data":{}}}"#, payload(column))).await;
    }
    let mv = Envelope::new(MessageType::GameMove)
        .with_data(&json!({ "column": 10 }))
        .unwrap();
    send(&mut b, &mv).await;
    for column in 0..10 {
        let mv = recv_kind(&mut a, MessageType::GameMove).await;
        assert_eq!(mv.data_text(), Some(payload(column).as_str()));
        assert_eq!(mv.player_id.as_deref(), Some(b_id.as_str()));
    }
    let last = recv_kind(&mut a, MessageType::GameMove).await;
    assert_eq!(last.decode_data::<serde_json::Value>().unwrap(), json!({ "column": 10 }));

    b.close(None).await.unwrap();
    let ended = recv_kind(&mut a, MessageType::GameEnded).await;
    assert_eq!(ended.player_id.as_deref(), Some(b_id.as_str()));

    send(&mut a, &join).await;
    let err: ErrorData = recv_kind(&mut a, MessageType::Error).await.decode_data().unwrap();
    assert_eq!(err.error, "Room not found");
}

#[tokio::test]
async fn bad_frames_get_error_replies() {
    let addr = start_server().await;
    let (mut ws, _) = connect(addr).await;

    send_raw(&mut ws, "not json").await;
    let err: ErrorData = recv_kind(&mut ws, MessageType::Error).await.decode_data().unwrap();
    assert_eq!(err.error, "Invalid message");

    send_raw(&mut ws, r#"{"type":"teleport"}"#).await;
    let err: ErrorData = recv_kind(&mut ws, MessageType::Error).await.decode_data().unwrap();
    assert_eq!(err.error, "Unknown message type");

    send(&mut ws, &Envelope::new(MessageType::LeaveRoom)).await;
    let err: ErrorData = recv_kind(&mut ws, MessageType::Error).await.decode_data().unwrap();
    assert_eq!(err.error, "Not in a room");
}
