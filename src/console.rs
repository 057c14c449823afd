use gameroom_client::NetworkSession;
use gameroom_protocol::{
    ChatData, Envelope, ErrorData, GameKind, MessageType, PlayerUpdateData, RoomInfo, StartGameData,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Rooms,
    Create { game_type: String, room_name: String },
    Join(String),
    Leave,
    Start,
    Move(Value),
    Avatar(i32),
    Chat(String),
    Help,
    Quit,
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    match word.to_lowercase().as_str() {
        "rooms" | "ls" => Ok(Command::Rooms),
        "create" => {
            let (game_type, room_name) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if game_type.is_empty() {
                return Err("usage: create <game> [name]".to_string());
            }
            let room_name = match room_name.trim() {
                "" => format!("{game_type} room"),
                name => name.to_string(),
            };
            Ok(Command::Create { game_type: game_type.to_string(), room_name })
        }
        "join" if !rest.is_empty() => Ok(Command::Join(rest.to_string())),
        "join" => Err("usage: join <room id or list number>".to_string()),
        "leave" => Ok(Command::Leave),
        "start" => Ok(Command::Start),
        "move" => serde_json::from_str(rest)
            .map(Command::Move)
            .map_err(|e| format!("move needs a JSON payload: {e}")),
        "avatar" => rest
            .parse()
            .map(Command::Avatar)
            .map_err(|_| "usage: avatar <number>".to_string()),
        "chat" if !rest.is_empty() => Ok(Command::Chat(rest.to_string())),
        "chat" => Err("usage: chat <message>".to_string()),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err(String::new()),
        other => Err(format!("unknown command: {other}")),
    }
}

fn print_help() {
    let games: Vec<&str> = GameKind::ALL.iter().map(GameKind::as_str).collect();
    println!("\n📋 Commands:");
    println!("  rooms               - List rooms");
    println!("  create <game> [name] - Create a room ({})", games.join(", "));
    println!("  join <id|number>    - Join a room by id or list number");
    println!("  leave               - Leave the current room");
    println!("  start               - Start the game in your room");
    println!("  move <json>         - Send a game move");
    println!("  avatar <n>          - Pick an avatar");
    println!("  chat <msg>          - Talk to your room");
    println!("  quit                - Exit\n");
}

fn print_rooms(rooms: &[RoomInfo]) {
    if rooms.is_empty() {
        println!("🏠 No rooms yet");
        return;
    }
    println!("🏠 Rooms:");
    for (i, room) in rooms.iter().enumerate() {
        let status = if room.started { " [PLAYING]" } else { "" };
        println!(
            "  {}. {} ({}) {}/{}{}  id={}",
            i + 1,
            room.name,
            room.game_type,
            room.players,
            room.max_players,
            status,
            room.id
        );
    }
}

/// Resolves a 1-based list number against the cached room list; anything
/// else is taken as a room id.
fn resolve_room(session: &NetworkSession, arg: &str) -> String {
    arg.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| session.rooms().get(i).map(|r| r.id.clone()))
        .unwrap_or_else(|| arg.to_string())
}

fn print_event(envelope: &Envelope) {
    let who = envelope.player_id.as_deref().unwrap_or("?");
    match envelope.kind {
        MessageType::Connected => println!("👋 Connected as {who}"),
        MessageType::RoomCreated => println!("🆕 Room created: {}", envelope.room_id.as_deref().unwrap_or("?")),
        MessageType::PlayerJoined => println!("🚪 {who} joined"),
        MessageType::PlayerLeft => println!("🚶 {who} left"),
        MessageType::GameEnded => println!("🛑 Game ended, {who} left"),
        MessageType::StartGame => match envelope.decode_data::<StartGameData>() {
            Ok(start) => {
                let names: Vec<&str> = start.players.iter().map(|p| p.name.as_str()).collect();
                println!(
                    "🎲 Game started! You are seat {} of {} ({})",
                    start.player_number,
                    start.total_players,
                    names.join(", ")
                );
            }
            Err(e) => println!("🎲 Game started (unreadable roster: {e})"),
        },
        MessageType::GameMove => println!("♟️  Move from {who}: {}", envelope.data_text().unwrap_or("null")),
        MessageType::PlayerUpdate => {
            if let Ok(update) = envelope.decode_data::<PlayerUpdateData>() {
                println!("🎭 {} is now {} ({})", update.player_id, update.name, update.avatar);
            }
        }
        MessageType::Chat => {
            if let Ok(chat) = envelope.decode_data::<ChatData>() {
                println!("💬 {who}: {}", chat.message);
            }
        }
        MessageType::Error => {
            if let Ok(err) = envelope.decode_data::<ErrorData>() {
                println!("❌ {}", err.error);
            }
        }
        MessageType::RoomList | MessageType::CreateRoom | MessageType::JoinRoom | MessageType::LeaveRoom
        | MessageType::SetAvatar => {}
    }
}

/// Reads commands from stdin until `quit` or EOF.
pub async fn run(session: NetworkSession) -> anyhow::Result<()> {
    for kind in MessageType::ALL {
        session.register_handler(kind, print_event);
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(msg) if msg.is_empty() => continue,
            Err(msg) => {
                println!("❓ {msg}");
                continue;
            }
        };
        let sent = match command {
            Command::Quit => break,
            Command::Help => {
                print_help();
                Ok(())
            }
            Command::Rooms => {
                print_rooms(&session.rooms());
                Ok(())
            }
            Command::Create { game_type, room_name } => session.create_room(&game_type, &room_name),
            Command::Join(arg) => session.join_room(&resolve_room(&session, &arg)),
            Command::Leave => session.leave_room(),
            Command::Start => session.start_game(),
            Command::Move(payload) => session.send_move(&payload),
            Command::Avatar(n) => session.set_avatar(n),
            Command::Chat(text) => session.send_chat(&text),
        };
        if let Err(err) = sent {
            println!("❌ {err}");
        }
        if !session.is_connected() {
            println!("🔌 Connection lost");
            break;
        }
    }

    session.close();
    println!("👋 Goodbye!");
    Ok(())
}
