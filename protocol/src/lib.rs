use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// ---- Message Tags ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// server→client: carries the assigned player id
    Connected,
    /// server→client: full snapshot of every live room
    RoomList,
    CreateRoom,
    RoomCreated,
    JoinRoom,
    PlayerJoined,
    LeaveRoom,
    PlayerLeft,
    /// client→server request, then server→each member with a seat assignment
    StartGame,
    /// relayed to the rest of the room, never interpreted
    GameMove,
    SetAvatar,
    PlayerUpdate,
    /// forced teardown of a started room
    GameEnded,
    Error,
    Chat,
}

impl MessageType {
    pub const ALL: [MessageType; 15] = [
        MessageType::Connected,
        MessageType::RoomList,
        MessageType::CreateRoom,
        MessageType::RoomCreated,
        MessageType::JoinRoom,
        MessageType::PlayerJoined,
        MessageType::LeaveRoom,
        MessageType::PlayerLeft,
        MessageType::StartGame,
        MessageType::GameMove,
        MessageType::SetAvatar,
        MessageType::PlayerUpdate,
        MessageType::GameEnded,
        MessageType::Error,
        MessageType::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Connected => "connected",
            MessageType::RoomList => "room_list",
            MessageType::CreateRoom => "create_room",
            MessageType::RoomCreated => "room_created",
            MessageType::JoinRoom => "join_room",
            MessageType::PlayerJoined => "player_joined",
            MessageType::LeaveRoom => "leave_room",
            MessageType::PlayerLeft => "player_left",
            MessageType::StartGame => "start_game",
            MessageType::GameMove => "game_move",
            MessageType::SetAvatar => "set_avatar",
            MessageType::PlayerUpdate => "player_update",
            MessageType::GameEnded => "game_ended",
            MessageType::Error => "error",
            MessageType::Chat => "chat",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("envelope has no data")]
    MissingData,
    #[error("invalid envelope data: {0}")]
    InvalidData(#[source] serde_json::Error),
}

/// ---- Envelope ----
///
/// The one wire shape shared by coordination traffic and game moves. Only
/// the tag decides what `data` holds. It is kept as the sender's JSON text
/// so a relayed move reaches the peers byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(kind: MessageType) -> Self {
        Envelope {
            kind,
            player_id: None,
            room_id: None,
            game_type: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn with_game_type(mut self, game_type: impl Into<String>) -> Self {
        self.game_type = Some(game_type.into());
        self
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        self.data = Some(to_raw_value(data)?);
        Ok(self)
    }

    /// Shorthand for the server's `error` reply.
    pub fn error(message: impl Into<String>) -> Self {
        let data = ErrorData {
            error: message.into(),
        };
        Envelope {
            data: to_raw_value(&data).ok(),
            ..Envelope::new(MessageType::Error)
        }
    }

    /// The payload exactly as it appeared on the wire.
    pub fn data_text(&self) -> Option<&str> {
        self.data.as_deref().map(RawValue::get)
    }

    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let raw = self.data_text().ok_or(ProtocolError::MissingData)?;
        serde_json::from_str(raw).map_err(ProtocolError::InvalidData)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses one text frame. A well-formed object whose tag is outside the
    /// enumeration yields `UnknownType` rather than `Malformed`, so the
    /// server can answer it like any other unknown request.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        if let Some(tag) = value.get("type").and_then(Value::as_str) {
            tag.parse::<MessageType>()?;
        }
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.player_id == other.player_id
            && self.room_id == other.room_id
            && self.game_type == other.game_type
            && self.data_text() == other.data_text()
            && self.timestamp == other.timestamp
    }
}

/// ---- Coordination Payloads ----
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub game_type: String,
    pub players: usize,
    pub max_players: usize,
    pub started: bool,
}

impl RoomInfo {
    /// Rooms a browsing player may still enter. Multi-seat rooms stay
    /// listed until they start.
    pub fn is_joinable(&self) -> bool {
        !self.started && (self.max_players > TWO_SEAT_CAPACITY || self.players < self.max_players)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomListData {
    pub rooms: Vec<RoomInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRoomData {
    pub game_type: String,
    pub room_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRoomData {
    pub room_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetAvatarData {
    pub avatar: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub avatar: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerUpdateData {
    pub player_id: String,
    pub avatar: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorData {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatData {
    pub message: String,
}

/// Seat assignment handed to each member when a room starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartGameData {
    /// zero-based, arrival order
    pub player_number: usize,
    pub total_players: usize,
    pub players: Vec<PlayerInfo>,
}

impl StartGameData {
    /// Seat that owns the given turn when turns rotate in seat order.
    pub fn seat_for_turn(&self, turn: usize) -> usize {
        if self.total_players == 0 {
            return 0;
        }
        turn % self.total_players
    }

    pub fn is_my_turn(&self, turn: usize) -> bool {
        self.seat_for_turn(turn) == self.player_number
    }

    pub fn me(&self) -> Option<&PlayerInfo> {
        self.players.get(self.player_number)
    }
}

/// ---- Game Types ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// dice
    Yahtzee,
    /// area control
    Santorini,
    /// connection
    ConnectFour,
    /// pit-and-stone
    Mancala,
    /// tile matching
    Memory,
}

pub const TWO_SEAT_CAPACITY: usize = 2;
pub const MULTI_SEAT_CAPACITY: usize = 20;

impl GameKind {
    pub const ALL: [GameKind; 5] = [
        GameKind::Yahtzee,
        GameKind::Santorini,
        GameKind::ConnectFour,
        GameKind::Mancala,
        GameKind::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Yahtzee => "yahtzee",
            GameKind::Santorini => "santorini",
            GameKind::ConnectFour => "connect_four",
            GameKind::Mancala => "mancala",
            GameKind::Memory => "memory",
        }
    }

    pub fn max_players(&self) -> usize {
        match self {
            GameKind::Yahtzee | GameKind::Memory => MULTI_SEAT_CAPACITY,
            GameKind::Santorini | GameKind::ConnectFour | GameKind::Mancala => TWO_SEAT_CAPACITY,
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::Yahtzee => write!(f, "Yahtzee"),
            GameKind::Santorini => write!(f, "Santorini"),
            GameKind::ConnectFour => write!(f, "Connect Four"),
            GameKind::Mancala => write!(f, "Mancala"),
            GameKind::Memory => write!(f, "Memory"),
        }
    }
}

impl FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameKind::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| format!("unknown game type `{s}`"))
    }
}

/// Capacity for a raw game-type tag. Unknown tags are treated as two-seat.
pub fn max_players_for(game_type: &str) -> usize {
    game_type
        .parse::<GameKind>()
        .map(|g| g.max_players())
        .unwrap_or(TWO_SEAT_CAPACITY)
}

/// Roster size a room must reach before `start_game` is accepted.
pub fn players_needed_to_start(max_players: usize) -> usize {
    if max_players == TWO_SEAT_CAPACITY {
        TWO_SEAT_CAPACITY
    } else {
        1
    }
}

/// ---- Avatars ----
pub const AVATAR_NAMES: [&str; 23] = [
    "Human",
    "Teddy",
    "Kaycat",
    "Zach Rabbit",
    "Kiraffe",
    "Owlive",
    "Milliepede",
    "Sweet Puppy Paw",
    "Tygler",
    "Chimpancici",
    "Papapus",
    "Kaitlynx",
    "Reagator",
    "Ocelivia",
    "Hen-ry",
    "Tomouse",
    "Karabou",
    "Valkyrie",
    "Eleanor",
    "Stella",
    "Huckleberry",
    "Winston",
    "Baxter",
];

pub const DEFAULT_AVATAR: i32 = 0;

pub fn avatar_name(avatar: i32) -> Option<&'static str> {
    usize::try_from(avatar)
        .ok()
        .and_then(|i| AVATAR_NAMES.get(i).copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_serialize_as_wire_strings() {
        for tag in MessageType::ALL {
            let encoded = serde_json::to_value(tag).unwrap();
            assert_eq!(encoded, Value::String(tag.as_str().to_string()));
            assert_eq!(tag.as_str().parse::<MessageType>().unwrap(), tag);
        }
    }

    #[test]
    fn absent_fields_are_omitted() {
        let text = Envelope::new(MessageType::LeaveRoom).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("type"), Some(&json!("leave_room")));
        assert!(obj.contains_key("timestamp"));
        assert!(!obj.contains_key("player_id"));
        assert!(!obj.contains_key("room_id"));
        assert!(!obj.contains_key("game_type"));
        assert!(!obj.contains_key("data"));
    }

    #[test]
    fn decode_accepts_foreign_client_shape() {
        let text = r#"{"type":"create_room","data":{"game_type":"connect_four","room_name":"Den"},"timestamp":"2024-05-01T12:00:00Z"}"#;
        let env = Envelope::decode(text).unwrap();
        assert_eq!(env.kind, MessageType::CreateRoom);
        let data: CreateRoomData = env.decode_data().unwrap();
        assert_eq!(data.game_type, "connect_four");
        assert_eq!(data.room_name, "Den");
    }

    #[test]
    fn decode_defaults_missing_timestamp() {
        let env = Envelope::decode(r#"{"type":"start_game"}"#).unwrap();
        assert_eq!(env.kind, MessageType::StartGame);
        assert!(env.data.is_none());
    }

    #[test]
    fn decode_distinguishes_unknown_tag_from_garbage() {
        assert!(matches!(
            Envelope::decode(r#"{"type":"join_lobby"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "join_lobby"
        ));
        assert!(matches!(
            Envelope::decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn move_payload_survives_verbatim() {
        let payload = json!({"column": 3, "nested": {"a": [1, 2, 3]}});
        let env = Envelope::new(MessageType::GameMove)
            .with_data(&payload)
            .unwrap();
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back.decode_data::<Value>().unwrap(), payload);
    }

    #[test]
    fn data_text_is_kept_as_sent() {
        let data = r#"{"z":1, "a":2,"big":123456789012345678901234567890,"f":0.10000000000000000001}"#;
        let text = format!(r#"{{"type":"game_move","data":{data}}}"#);
        let env = Envelope::decode(&text).unwrap();
        assert_eq!(env.data_text(), Some(data));
        assert!(env.encode().unwrap().contains(data));
    }

    #[test]
    fn decode_data_reports_missing_and_invalid() {
        let empty = Envelope::new(MessageType::JoinRoom);
        assert!(matches!(
            empty.decode_data::<JoinRoomData>(),
            Err(ProtocolError::MissingData)
        ));
        let wrong = Envelope::new(MessageType::JoinRoom)
            .with_data(&json!({"room": 5}))
            .unwrap();
        assert!(matches!(
            wrong.decode_data::<JoinRoomData>(),
            Err(ProtocolError::InvalidData(_))
        ));
    }

    #[test]
    fn error_envelope_carries_message() {
        let env = Envelope::error("Room is full");
        assert_eq!(env.kind, MessageType::Error);
        let data: ErrorData = env.decode_data().unwrap();
        assert_eq!(data.error, "Room is full");
    }

    #[test]
    fn capacity_table() {
        assert_eq!(max_players_for("yahtzee"), MULTI_SEAT_CAPACITY);
        assert_eq!(max_players_for("memory"), MULTI_SEAT_CAPACITY);
        assert_eq!(max_players_for("connect_four"), 2);
        assert_eq!(max_players_for("santorini"), 2);
        assert_eq!(max_players_for("mancala"), 2);
        assert_eq!(max_players_for("checkers"), 2);
        assert_eq!(players_needed_to_start(2), 2);
        assert_eq!(players_needed_to_start(MULTI_SEAT_CAPACITY), 1);
    }

    #[test]
    fn joinable_rooms() {
        let mut room = RoomInfo {
            id: "r".into(),
            name: "Den".into(),
            game_type: "connect_four".into(),
            players: 1,
            max_players: 2,
            started: false,
        };
        assert!(room.is_joinable());
        room.players = 2;
        assert!(!room.is_joinable());
        room.max_players = MULTI_SEAT_CAPACITY;
        assert!(room.is_joinable());
        room.started = true;
        assert!(!room.is_joinable());
    }

    #[test]
    fn turn_rotation_follows_seats() {
        let start = StartGameData {
            player_number: 1,
            total_players: 3,
            players: vec![
                PlayerInfo { id: "a".into(), name: "Human".into(), avatar: 0 },
                PlayerInfo { id: "b".into(), name: "Teddy".into(), avatar: 1 },
                PlayerInfo { id: "c".into(), name: "Kaycat".into(), avatar: 2 },
            ],
        };
        assert!(!start.is_my_turn(0));
        assert!(start.is_my_turn(1));
        assert!(start.is_my_turn(4));
        assert_eq!(start.me().map(|p| p.id.as_str()), Some("b"));
    }

    #[test]
    fn avatar_names_lookup() {
        assert_eq!(avatar_name(DEFAULT_AVATAR), Some("Human"));
        assert_eq!(avatar_name(22), Some("Baxter"));
        assert_eq!(avatar_name(23), None);
        assert_eq!(avatar_name(-1), None);
    }

    #[test]
    fn game_kind_parses_wire_names() {
        for kind in GameKind::ALL {
            assert_eq!(kind.as_str().parse::<GameKind>().unwrap(), kind);
        }
        assert!("chess".parse::<GameKind>().is_err());
    }
}
